//! x86_64 bring-up.
//!
//! The firmware-side boot assembly enters `kernel_main` in long mode with
//! flat segments, a stack, and paging already on; `__kernel_end` comes from
//! its linker script. On hosted targets this binary is an empty shell so
//! workspace test builds link cleanly.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

// A bare-metal build for the other architecture still needs the library's
// panic handler to link.
#[cfg(all(target_os = "none", not(target_arch = "x86_64")))]
use zixiao as _;

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
mod kmain {
    use zixiao::arch_impl::x86_64 as arch;
    use zixiao::memory::{self, frame_allocator, heap, layout};
    use zixiao::task::scheduler;
    use zixiao::{console, console_println, irq, logger, time};

    extern "C" {
        /// First byte past the kernel image, from the linker script.
        static __kernel_end: u8;
    }

    #[no_mangle]
    pub extern "C" fn kernel_main() -> ! {
        console::init();
        logger::init();

        console_println!("========================================");
        console_println!("  Zixiao - x86_64");
        console_println!("========================================");
        console_println!();

        let mem_start = unsafe { &__kernel_end as *const u8 as u64 };
        memory::init(mem_start, layout::RAM_END).expect("memory bring-up failed");
        arch::mmu::init().expect("MMU bring-up failed");

        arch::interrupts::init();
        irq::init();
        time::init();
        arch::cpu::enable_interrupts();
        log::info!("interrupts enabled");

        pmm_smoke_test();
        heap_smoke_test();

        // Timer interference during task-table setup helps nobody.
        arch::cpu::disable_interrupts();
        scheduler::init();
        arch::cpu::enable_interrupts();
        demo::spawn();

        log::info!("starting task execution");
        scheduler::schedule();

        // Only reached when the queue was empty at first switch; this
        // context then simply carries on as the idle loop.
        loop {
            arch::cpu::wait_for_interrupt();
        }
    }

    fn pmm_smoke_test() {
        let a = frame_allocator::allocate_page();
        let b = frame_allocator::allocate_page();
        let c = frame_allocator::allocate_page();
        log::info!("PMM smoke: allocated {:?} {:?} {:?}", a, b, c);
        if let Some(b) = b {
            frame_allocator::free_page(b);
            let d = frame_allocator::allocate_page();
            log::info!(
                "PMM smoke: freed {:#x}, got {:?} back ({} pages free)",
                b,
                d,
                frame_allocator::free_pages()
            );
        }
    }

    fn heap_smoke_test() {
        let p1 = heap::kmalloc(64);
        let p2 = heap::kmalloc(128);
        let p3 = heap::kmalloc(256);
        log::info!("heap smoke: {:?} {:?} {:?}", p1, p2, p3);
        if let Some(p2) = p2 {
            heap::kfree(p2.as_ptr());
            let p4 = heap::kmalloc(100);
            log::info!("heap smoke: freed 128B block, 100B landed at {:?}", p4);
        }
        let stats = heap::stats();
        log::info!(
            "heap smoke: {} KiB used, {} KiB free",
            stats.used / 1024,
            stats.free / 1024
        );
    }

    mod demo {
        use zixiao::task::scheduler;
        use zixiao::{console_println, task};

        pub fn spawn() {
            let a = scheduler::task_create("demo_a", demo_task_a, 5, 8192);
            let b = scheduler::task_create("demo_b", demo_task_b, 5, 8192);
            let c = scheduler::task_create("demo_c", demo_task_c, 3, 8192);
            for id in [a, b, c].into_iter().flatten() {
                scheduler::task_ready(id);
            }
        }

        fn demo_task_a() {
            for i in 0..10 {
                console_println!("[demo_a] iteration {}", i);
                task::task_yield();
            }
            console_println!("[demo_a] done");
        }

        fn demo_task_b() {
            for i in 0..10 {
                console_println!("[demo_b] iteration {}", i);
                task::task_yield();
            }
            console_println!("[demo_b] done");
        }

        fn demo_task_c() {
            let mut i = 0u64;
            loop {
                console_println!("[demo_c] iteration {}", i);
                i += 1;
                task::task_yield();
            }
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}

//! Kernel console sink.
//!
//! Everything the kernel prints funnels through [`put_char`]: the boot
//! narration (via the `log` facade), the panic path, and the demo tasks.
//! `\n` expands to `\r\n` here so serial terminals stay aligned.

use core::fmt;

use crate::arch_impl::without_interrupts;

pub fn init() {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        crate::serial::init();
        crate::drivers::vga::init();
    }
    #[cfg(all(target_arch = "aarch64", target_os = "none"))]
    crate::serial::init();
}

/// Write one raw byte to every attached sink.
fn sink(byte: u8) {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        crate::serial::write_byte(byte);
        crate::drivers::vga::write_byte(byte);
    }
    #[cfg(all(target_arch = "aarch64", target_os = "none"))]
    crate::serial::write_byte(byte);
    #[cfg(not(target_os = "none"))]
    let _ = byte;
}

/// Byte-out with `\n` -> `\r\n` translation.
pub fn put_char(byte: u8) {
    if byte == b'\n' {
        sink(b'\r');
    }
    sink(byte);
}

pub fn write(s: &str) {
    for byte in s.bytes() {
        put_char(byte);
    }
}

/// `fmt::Write` adapter over [`put_char`].
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write(s);
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    // One record at a time: a timer IRQ logging mid-line would interleave
    // output and deadlock on the sink lock.
    without_interrupts(|| {
        let _ = Console.write_fmt(args);
    });
}

#[macro_export]
macro_rules! console_print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! console_println {
    () => ($crate::console_print!("\n"));
    ($($arg:tt)*) => ($crate::console_print!("{}\n", format_args!($($arg)*)));
}

//! Cascaded 8259 PICs remapped to vectors 0x20/0x28.
//!
//! Everything is masked at init except the cascade line; drivers open their
//! own line through `enable_irq`. Spurious IRQ 7/15 deliveries are filtered
//! by reading the in-service register.

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

use crate::arch_impl::traits::InterruptChip;

pub const PIC_1_OFFSET: u8 = 0x20;
pub const PIC_2_OFFSET: u8 = 0x28;

static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

const PIC1_COMMAND: u16 = 0x20;
const PIC2_COMMAND: u16 = 0xA0;
/// OCW3: next read from the command port returns the in-service register.
const OCW3_READ_ISR: u8 = 0x0B;

fn read_isr(command_port: u16) -> u8 {
    let mut port: Port<u8> = Port::new(command_port);
    unsafe {
        port.write(OCW3_READ_ISR);
        port.read()
    }
}

pub struct Pic8259;

impl InterruptChip for Pic8259 {
    const MAX_IRQS: usize = 16;

    fn init() {
        let mut pics = PICS.lock();
        unsafe {
            pics.initialize();
            // Only the cascade (IRQ 2) stays open; nothing reaches the CPU
            // until its driver calls enable_irq.
            pics.write_masks(0xFB, 0xFF);
        }
    }

    fn enable_irq(irq: u32) {
        if irq >= 16 {
            return;
        }
        let mut pics = PICS.lock();
        unsafe {
            let mut masks = pics.read_masks();
            if irq < 8 {
                masks[0] &= !(1 << irq);
            } else {
                masks[1] &= !(1 << (irq - 8));
            }
            pics.write_masks(masks[0], masks[1]);
        }
    }

    fn disable_irq(irq: u32) {
        if irq >= 16 {
            return;
        }
        let mut pics = PICS.lock();
        unsafe {
            let mut masks = pics.read_masks();
            if irq < 8 {
                masks[0] |= 1 << irq;
            } else {
                masks[1] |= 1 << (irq - 8);
            }
            pics.write_masks(masks[0], masks[1]);
        }
    }

    fn set_priority(_irq: u32, _priority: u8) {
        // Fixed priorities on the 8259; nothing to program.
    }

    fn acknowledge() -> Option<u32> {
        // Delivery is vectored; the IDT stub names the line.
        None
    }

    fn end_of_interrupt(irq: u32) {
        if irq >= 16 {
            return;
        }
        unsafe {
            PICS.lock()
                .notify_end_of_interrupt(PIC_1_OFFSET + irq as u8)
        };
    }

    fn is_spurious(irq: u32) -> bool {
        match irq {
            7 => read_isr(PIC1_COMMAND) & 0x80 == 0,
            15 => {
                if read_isr(PIC2_COMMAND) & 0x80 == 0 {
                    // The master saw the cascade as genuine; complete it.
                    unsafe {
                        PICS.lock().notify_end_of_interrupt(PIC_1_OFFSET + 2)
                    };
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

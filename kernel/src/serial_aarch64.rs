//! PL011 UART on the QEMU virt machine (0x0900_0000).
//!
//! Output plus non-blocking input; the receive side is polled, not
//! interrupt-driven.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};

const PL011_BASE: usize = 0x0900_0000;

register_bitfields![u32,
    FR [
        /// Transmit FIFO full.
        TXFF OFFSET(5) NUMBITS(1) [],
        /// Receive FIFO empty.
        RXFE OFFSET(4) NUMBITS(1) [],
    ],
    LCR_H [
        WLEN OFFSET(5) NUMBITS(2) [
            EightBit = 3
        ],
        /// FIFO enable.
        FEN OFFSET(4) NUMBITS(1) [],
    ],
    CR [
        RXE OFFSET(9) NUMBITS(1) [],
        TXE OFFSET(8) NUMBITS(1) [],
        UARTEN OFFSET(0) NUMBITS(1) [],
    ],
];

register_structs! {
    Pl011Registers {
        (0x00 => dr: ReadWrite<u32>),
        (0x04 => _reserved0),
        (0x18 => fr: ReadOnly<u32, FR::Register>),
        (0x1c => _reserved1),
        (0x24 => ibrd: WriteOnly<u32>),
        (0x28 => fbrd: WriteOnly<u32>),
        (0x2c => lcr_h: WriteOnly<u32, LCR_H::Register>),
        (0x30 => cr: ReadWrite<u32, CR::Register>),
        (0x34 => _reserved2),
        (0x38 => imsc: ReadWrite<u32>),
        (0x3c => _reserved3),
        (0x44 => icr: WriteOnly<u32>),
        (0x48 => @END),
    }
}

fn regs() -> &'static Pl011Registers {
    unsafe { &*(PL011_BASE as *const Pl011Registers) }
}

pub fn init() {
    let uart = regs();
    uart.cr.set(0);
    uart.icr.set(0x7FF);
    // 24 MHz UART clock / (16 * 115200) = 13 + 1/64.
    uart.ibrd.set(13);
    uart.fbrd.set(1);
    uart.lcr_h.write(LCR_H::WLEN::EightBit + LCR_H::FEN::SET);
    // Receive is polled; keep every UART interrupt masked.
    uart.imsc.set(0);
    uart.cr
        .write(CR::UARTEN::SET + CR::TXE::SET + CR::RXE::SET);
}

/// Raw byte out; newline translation happens in the console layer.
pub fn write_byte(byte: u8) {
    let uart = regs();
    while uart.fr.is_set(FR::TXFF) {
        core::hint::spin_loop();
    }
    uart.dr.set(byte as u32);
}

/// Non-blocking read of one byte from the receive FIFO.
pub fn try_read_byte() -> Option<u8> {
    let uart = regs();
    if uart.fr.is_set(FR::RXFE) {
        None
    } else {
        Some((uart.dr.get() & 0xFF) as u8)
    }
}

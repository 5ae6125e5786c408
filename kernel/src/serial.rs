//! COM1 serial output (16550 UART).

use spin::Mutex;
use uart_16550::SerialPort;

const COM1_PORT: u16 = 0x3F8;

static SERIAL1: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1_PORT) });

pub fn init() {
    SERIAL1.lock().init();
}

/// Raw byte out; newline translation happens in the console layer.
pub fn write_byte(byte: u8) {
    SERIAL1.lock().send_raw(byte);
}

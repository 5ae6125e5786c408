//! VGA text-mode console: 80x25 cells at 0xB8000.
//!
//! Mirrors the serial sink so the machine's own display shows the boot log.
//! The buffer page is identity-mapped as device memory during MMU bring-up.

use spin::Mutex;

const VGA_BUFFER: usize = 0xB8000;
const WIDTH: usize = 80;
const HEIGHT: usize = 25;
/// Light grey on black.
const ATTR: u8 = 0x07;

struct VgaWriter {
    col: usize,
    row: usize,
}

static WRITER: Mutex<VgaWriter> = Mutex::new(VgaWriter { col: 0, row: 0 });

fn cell(row: usize, col: usize) -> *mut u16 {
    (VGA_BUFFER + (row * WIDTH + col) * 2) as *mut u16
}

impl VgaWriter {
    fn put(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.col = 0,
            byte => {
                if self.col >= WIDTH {
                    self.new_line();
                }
                let value = (ATTR as u16) << 8 | byte as u16;
                unsafe { core::ptr::write_volatile(cell(self.row, self.col), value) };
                self.col += 1;
            }
        }
    }

    fn new_line(&mut self) {
        self.col = 0;
        if self.row + 1 < HEIGHT {
            self.row += 1;
            return;
        }
        for row in 1..HEIGHT {
            for col in 0..WIDTH {
                unsafe {
                    let value = core::ptr::read_volatile(cell(row, col));
                    core::ptr::write_volatile(cell(row - 1, col), value);
                }
            }
        }
        self.blank_row(HEIGHT - 1);
    }

    fn blank_row(&mut self, row: usize) {
        let blank = (ATTR as u16) << 8 | b' ' as u16;
        for col in 0..WIDTH {
            unsafe { core::ptr::write_volatile(cell(row, col), blank) };
        }
    }

    fn clear(&mut self) {
        for row in 0..HEIGHT {
            self.blank_row(row);
        }
        self.col = 0;
        self.row = 0;
    }
}

pub fn init() {
    WRITER.lock().clear();
}

pub fn write_byte(byte: u8) {
    WRITER.lock().put(byte);
}

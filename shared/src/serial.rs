//! COM1 console sink for bare-metal builds.

use core::{arch::asm, fmt};

const COM1: u16 = 0x3f8;
const DATA: u16 = COM1; // Transmit / receive buffer
const IER: u16 = COM1 + 1; // Interrupt enable
const FCR: u16 = COM1 + 2; // FIFO control
const LCR: u16 = COM1 + 3; // Line control
const MCR: u16 = COM1 + 4; // Modem control
const LSR: u16 = COM1 + 5; // Line status

const LSR_THR_EMPTY: u8 = 0x20;

unsafe fn outb(port: u16, byte: u8) {
    asm!("out dx, al", in("dx") port, in("al") byte);
}

unsafe fn inb(port: u16) -> u8 {
    let res: u8;
    asm!("in al, dx", in("dx") port, out("al") res);
    res
}

pub struct SerialWriter {
    initialized: bool,
}

impl SerialWriter {
    fn ensure_initialized(&mut self) {
        if self.initialized {
            return;
        }

        // SAFETY: Standard 8N1 setup at 38400 baud, https://wiki.osdev.org/Serial_Ports
        unsafe {
            outb(IER, 0x00);
            outb(LCR, 0x80);
            outb(DATA, 0x03);
            outb(IER, 0x00);
            outb(LCR, 0x03);
            outb(FCR, 0xC7);
            outb(MCR, 0x0F);
        }
        self.initialized = true;
    }
}

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.ensure_initialized();

        for b in s.bytes() {
            // SAFETY: Waits for the transmit holding register to drain first.
            unsafe {
                while inb(LSR) & LSR_THR_EMPTY == 0 {}
                outb(DATA, b);
            }
        }

        Ok(())
    }
}

pub static mut SERIAL_WRITER: SerialWriter = SerialWriter { initialized: false };

use core::fmt;

/// Where a line of console output should go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Out,
    /// Diagnostics. On bare metal these share the serial line with `Out`.
    Err,
}

#[cfg(all(target_os = "none", target_arch = "x86"))]
pub fn write(stream: Stream, args: fmt::Arguments, newline: bool) {
    use crate::serial::SERIAL_WRITER;
    use core::fmt::Write;

    let _ = stream;
    // SAFETY: Console output happens with interrupts disabled on a single core.
    let serial = unsafe { &mut *core::ptr::addr_of_mut!(SERIAL_WRITER) };
    let _ = serial.write_fmt(args);
    if newline {
        let _ = serial.write_str("\n");
    }
}

#[cfg(all(target_os = "none", not(target_arch = "x86")))]
pub fn write(_stream: Stream, _args: fmt::Arguments, _newline: bool) {}

#[cfg(not(target_os = "none"))]
pub fn write(stream: Stream, args: fmt::Arguments, newline: bool) {
    match (stream, newline) {
        (Stream::Out, true) => std::println!("{args}"),
        (Stream::Out, false) => std::print!("{args}"),
        (Stream::Err, true) => std::eprintln!("{args}"),
        (Stream::Err, false) => std::eprint!("{args}"),
    }
}

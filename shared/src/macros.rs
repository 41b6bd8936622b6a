//! Console output macros.
//!
//! These shadow the standard library macros of the same name so that kernel
//! code prints the same way whether it runs on bare metal or in a host test.

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::console::write($crate::console::Stream::Out, format_args!($($arg)*), false);
    }};
}

#[macro_export]
macro_rules! println {
    () => {{
        $crate::console::write($crate::console::Stream::Out, format_args!(""), true);
    }};
    ($($arg:tt)*) => {{
        $crate::console::write($crate::console::Stream::Out, format_args!($($arg)*), true);
    }};
}

#[macro_export]
macro_rules! eprintln {
    () => {{
        $crate::console::write($crate::console::Stream::Err, format_args!(""), true);
    }};
    ($($arg:tt)*) => {{
        $crate::console::write($crate::console::Stream::Err, format_args!($($arg)*), true);
    }};
}

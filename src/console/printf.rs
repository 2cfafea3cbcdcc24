/// Print out formatted text to the console sink.
/// Never blocks: the message is dropped if the sink is busy.
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;

        let mut line = $crate::console::Line::new();
        let _ = core::write!(line, $($arg)*);
        $crate::console::report(line.as_str());
    }};
}
pub(crate) use print;

macro_rules! println {
    ($($arg:tt)*) => {{
        use $crate::console::printf::print;
        print!("{}\n", format_args!($($arg)*));
    }};
}
pub(crate) use println;

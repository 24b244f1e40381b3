// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! String-only writes for the reporter.
//!
//! The reporter writes either to a buffered stdout or, in tests, to a `String`. Everything it
//! produces is UTF-8, so this trait only accepts `&str`. Unlike [`std::fmt::Write`], errors are
//! [`std::io::Error`]s, so a closed stdout can be reported as such.

use std::{
    fmt,
    io::{self, BufWriter, Write},
};

/// A writer that accepts strings.
pub trait WriteStr {
    /// Writes a string.
    fn write_str(&mut self, s: &str) -> io::Result<()>;

    /// Flushes anything buffered by the writer.
    fn write_str_flush(&mut self) -> io::Result<()>;

    /// Writes formatted text. Called by the `write!` and `writeln!` macros.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        // Literal-only format strings need no formatting machinery.
        if let Some(s) = args.as_str() {
            return self.write_str(s);
        }

        let mut adapter = FmtAdapter {
            inner: self,
            error: None,
        };
        match fmt::write(&mut adapter, args) {
            Ok(()) => Ok(()),
            Err(fmt::Error) => Err(adapter
                .error
                .unwrap_or_else(|| io::Error::other("formatter error"))),
        }
    }
}

/// Bridges [`fmt::Write`] to [`WriteStr`], keeping the first I/O error.
struct FmtAdapter<'a, W: ?Sized> {
    inner: &'a mut W,
    error: Option<io::Error>,
}

impl<W: WriteStr + ?Sized> fmt::Write for FmtAdapter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_str(s).map_err(|err| {
            self.error.get_or_insert(err);
            fmt::Error
        })
    }
}

impl WriteStr for String {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.push_str(s);
        Ok(())
    }

    fn write_str_flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> WriteStr for BufWriter<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())
    }

    fn write_str_flush(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<T: WriteStr + ?Sized> WriteStr for &mut T {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        (**self).write_str(s)
    }

    fn write_str_flush(&mut self) -> io::Result<()> {
        (**self).write_str_flush()
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        (**self).write_fmt(args)
    }
}

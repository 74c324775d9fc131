//! Diagnostic output for the allocator.
//!
//! The allocator itself has no idea where its messages should go (UART,
//! framebuffer, a host test log). Whoever embeds it may register a
//! [`DiagSink`] once at startup; every diagnostic line is then forwarded to
//! that sink. When no sink is registered, diagnostics compile down to a
//! single initialization check and are dropped.

use core::fmt;

use conquer_once::spin::OnceCell;

use crate::err::{CanFail, DiagError};

static DIAG_SINK: OnceCell<&'static dyn DiagSink> = OnceCell::uninit();

/// Receiver for diagnostic messages emitted by the allocator.
///
/// Implementations only have to forward a single formatted message to their
/// output device.
///
/// # Examples
///
/// ```
/// use halffit::diag::DiagSink;
///
/// struct StdoutSink;
///
/// impl DiagSink for StdoutSink {
///     fn emit(&self, msg: core::fmt::Arguments) {
///         println!("{msg}");
///     }
/// }
/// ```
pub trait DiagSink: Send + Sync {
    /// Consumes one formatted diagnostic line.
    fn emit(&self, msg: fmt::Arguments);
}

/// Registers the global diagnostic sink.
///
/// The first registration wins and stays in place for the lifetime of the
/// process; later calls fail with [`DiagError::AlreadyRegistered`].
/// Messages emitted before any registration are dropped.
pub fn register_diag_sink(sink: &'static dyn DiagSink) -> CanFail<DiagError> {
    DIAG_SINK
        .try_init_once(|| sink)
        .map_err(|_| DiagError::AlreadyRegistered)
}

/// Forwards a formatted message to the registered sink, if any.
#[doc(hidden)]
pub fn emit(msg: fmt::Arguments) {
    if let Ok(sink) = DIAG_SINK.try_get() {
        sink.emit(msg);
    }
}

/// Emits a standard information message through the registered [`DiagSink`].
///
/// You can specify a 'context' as the first argument when calling the
/// macro, which will be inserted at the beginning of the message.
///
/// # Examples
///
/// ```
/// use halffit::info;
///
/// info!("halffit", "arena initialized");
/// ```
#[macro_export]
macro_rules! info {
    // A context was provided, so we insert it at the beginning of
    // the message.
    ($ctx: literal, $fmt: literal $(, $arg: expr)* $(,)?) => {
        $crate::diag::emit(::core::format_args!(
            concat!("[info] ", $ctx, " : ", $fmt) $(, $arg)*
        ))
    };
    ($fmt: literal $(, $arg: expr)* $(,)?) => {
        $crate::diag::emit(::core::format_args!(concat!("[info] ", $fmt) $(, $arg)*))
    };
}

/// Emits a standard error message through the registered [`DiagSink`].
///
/// You can specify a 'context' as the first argument when calling the
/// macro, which will be inserted at the beginning of the error message.
///
/// # Examples
///
/// ```
/// use halffit::error;
///
/// error!("halffit", "allocation of {} bytes failed", 128);
/// ```
#[macro_export]
macro_rules! error {
    // A context was provided, so we insert it at the beginning of
    // the message.
    ($ctx: literal, $fmt: literal $(, $arg: expr)* $(,)?) => {
        $crate::diag::emit(::core::format_args!(
            concat!("[error] ", $ctx, " : ", $fmt) $(, $arg)*
        ))
    };
    ($fmt: literal $(, $arg: expr)* $(,)?) => {
        $crate::diag::emit(::core::format_args!(concat!("[error] ", $fmt) $(, $arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl DiagSink for NullSink {
        fn emit(&self, _msg: fmt::Arguments) {}
    }

    #[test]
    fn unregistered_sink_drops_messages() {
        // Must not panic or block.
        emit(format_args!("dropped"));
        info!("diag", "still dropped: {}", 42);
    }

    #[test]
    fn only_the_first_registration_sticks() {
        static SINK: NullSink = NullSink;

        assert!(register_diag_sink(&SINK).is_ok());
        assert_eq!(
            register_diag_sink(&SINK).unwrap_err(),
            DiagError::AlreadyRegistered
        );
    }
}

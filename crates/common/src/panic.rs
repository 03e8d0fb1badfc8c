//! Helpers for turning caught panics into loggable values.

use std::{any::Any, backtrace::Backtrace};

/// Payload of a caught panic, as returned by `catch_unwind`.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Best-effort human-readable description of a panic payload.
///
/// `panic!("...")` produces either a `&'static str` or a `String`; anything
/// else (e.g. `panic_any(value)`) is reported by type only.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        e.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Capture a backtrace at the recovery site regardless of `RUST_BACKTRACE`.
pub fn capture_backtrace() -> String {
    Backtrace::force_capture().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_str_and_string_payloads() {
        let s: PanicPayload = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");

        let s: PanicPayload = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
    }

    #[test]
    fn falls_back_for_other_payloads() {
        let s: PanicPayload = Box::new(42_u32);
        assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
    }
}

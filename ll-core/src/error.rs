use core::fmt;

/// Errors returned by the BLE stack.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    ///
    /// This indicates a protocol violation, so the connection should
    /// considered lost (if one is currently established).
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when the application tries to fit too much data into a
    /// PDU or other fixed-size buffer, and also when reaching EOF prematurely
    /// while reading data from a buffer.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::IncompleteParse => "excess data in buffer",
        })
    }
}

/// Operation-level errors returned by the Link Layer's public API.
///
/// Modeled on `errcodes.h`'s `ENOMEM`/`EINVAL`/`EALREADY`/`ENOREADY`/`EBUSY`/`EINTERN` taxonomy:
/// every `LinkLayer` operation (`advertise_start`, `scan_start`, `conn_create`, ...) returns one of
/// these instead of panicking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LlError {
    /// A fixed-size resource (timer slot, PDU buffer) is exhausted.
    OutOfMemory,
    /// An argument violates a precondition (bad interval, empty channel map, ...).
    Invalid,
    /// The requested transition or timer start has already happened.
    Already,
    /// The operation requires a different current state (usually Standby).
    NotReady,
    /// The radio or a buffer is currently in use by another in-flight operation.
    Busy,
    /// An invariant the type system could not already rule out was violated.
    Internal,
}

impl fmt::Display for LlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LlError::OutOfMemory => "out of memory",
            LlError::Invalid => "invalid argument",
            LlError::Already => "already active",
            LlError::NotReady => "not ready",
            LlError::Busy => "busy",
            LlError::Internal => "internal error",
        })
    }
}

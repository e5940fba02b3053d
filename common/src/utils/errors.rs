use std::fmt::Display;

#[macro_export]
macro_rules! courier_err {
    // Case with just a message literal
    ($kind:expr, $msg:expr) => {
        $crate::utils::errors::CourierError {
            kind: $kind,
            message: $msg.into(),
            file: file!(),
            line: line!(),
        }
    };
    // Case with message + format arguments
    ($kind:expr, $fmt:expr, $($args:tt)*) => {
        $crate::utils::errors::CourierError {
            kind: $kind,
            message: format!($fmt, $($args)*),
            file: file!(),
            line: line!(),
        }
    };
}

#[derive(Debug)]
pub struct CourierError {
    pub kind: CourierErrorKind,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}
impl Display for CourierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({}:{})",
            self.kind.as_ref(),
            self.message,
            self.file,
            self.line
        )
    }
}
impl std::error::Error for CourierError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum CourierErrorKind {
    HttpGetRequest,
    HttpStatus,
    Deserialize,
    Serialize,

    InvalidData,
    InvalidUrl,
    ImageDecode,

    FileRead,
    FileWrite,

    DirRead,
    DirCreate,

    Base64Decode,

    StreamRead,
    StreamWrite,
    StreamBind,
    StreamConnect,
    StreamAccept,
    StreamClosed,

    PermissionDenied,

    DBusConnect,
    DBusProxyCall,
    DBusSignal,

    NotificationUnknown,
    PlatformRejected,
    PlatformUnavailable,
}

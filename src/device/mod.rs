pub mod scanner;
pub mod session;

pub use scanner::{FrameScanner, ScannerStats};
pub use session::{
    list_available_ports, DeviceSession, LinkStats, PortInfo, SampleRecord, SessionError,
    BAUD_RATE,
};

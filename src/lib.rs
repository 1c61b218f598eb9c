mod api;
mod board;
mod coordinator;
mod diff;
mod error;
mod legacy;
mod logger;
mod protocol;
mod transport;
mod types;

pub use api::{detect_api, DucoApi};
pub use board::ConnectivityBoardApi;
pub use coordinator::{spawn_polling, Coordinator, CoordinatorBuilder, PollSettings};
pub use error::{Error, Result};
pub use legacy::{CommunicationPrintApi, NODE_SCAN_RANGES};
pub use logger::MessageLogMode;
pub use protocol::{decode_legacy_state, encode_legacy_state, LEGACY_STATES};
pub use transport::Timeouts;
pub use types::*;

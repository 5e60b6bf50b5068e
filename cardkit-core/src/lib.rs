pub mod config;
pub mod idle;
pub mod props;
pub mod protocol;
pub mod request;

pub use config::{ConfigError, Settings, SettingsError, load_dotenv};
pub use idle::idle_timeout;
pub use protocol::{
    ChunkAssembler, ErrorKind, FRAME_DELIMITER, FrameDecoder, HostMessage, ProtocolError,
    WorkerMessage, encode_frame,
};
pub use request::{ContentType, RenderRequest, RenderResult, Scaling};

pub mod builder;
pub mod codec;
pub mod rest;
pub mod signer;
pub mod types;
pub mod websocket;

// Re-export main components
pub use builder::OkxBuilder;
pub use codec::OkxCodec;
pub use rest::OkxRest;
pub use signer::OkxSigner;
pub use types::{
    OkxAlgoOrderRequest, OkxClosePositionRequest, OkxOrderAck, OkxOrderId, OkxOrderRequest,
    OkxTicker,
};
pub use websocket::OkxWebSocket;

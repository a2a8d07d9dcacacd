pub mod api;

mod core;
pub use crate::core::{
    crypto::{ChaChaCipher, Cipher, Plaintext},
    event::Event,
    member::MembershipList,
    node::SwimNode,
    reaper::suspicion_timeout,
    transport::{StreamLayer, TcpStreamLayer, TransportLayer},
};

mod error;
pub use error::{Error, Result};

pub mod pb;
pub use pb::{NodeRecord, NodeState};

#[cfg(any(test, feature = "test-util"))]
#[path = "./test-utils/mod.rs"]
#[doc(hidden)]
mod test_utils;

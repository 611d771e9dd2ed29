//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts (macOS first).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate
//! - `TagExtractor` shelling out to `exiftool -json`
//! - `WaveInfoReader` using `lofty`
//! - `PlayerStateProvider` for Audirvana Origin (AppleScript) and Roon (`nowplaying-cli`)
//!
//! Every external program runs through [`run_command`] with a bounded timeout.
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{AudirvanaProvider, ExiftoolExtractor, ReqwestHttpClient};
//!
//! let http = ReqwestHttpClient::new()?;
//! let provider = AudirvanaProvider::new();
//! let extractor = ExiftoolExtractor::new();
//! ```

mod audirvana;
mod command;
mod exiftool;
mod http;
mod roon;
mod wave;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use audirvana::AudirvanaProvider;
pub use command::{run_command, DEFAULT_COMMAND_TIMEOUT};
pub use exiftool::ExiftoolExtractor;
pub use http::ReqwestHttpClient;
pub use roon::RoonProvider;
pub use wave::LoftyWaveReader;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;

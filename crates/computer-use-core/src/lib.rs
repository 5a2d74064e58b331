//! computer-use-core: desktop automation across Linux, WSL, Windows and macOS
//!
//! Detects what kind of host it runs on, picks screen capture and input
//! backends with fallback, manages virtual and forwarded X displays, and
//! gates every action through a safety validator before it touches the
//! host. [`dispatch::ActionDispatcher`] ties the pieces together behind the
//! stable tool-name surface.

pub mod constants;
pub mod context;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod model;
pub mod platform;
pub mod provider;
pub mod safety;
pub mod util;

pub use context::DesktopContext;
pub use dispatch::{ActionDispatcher, ToolName, ToolOutput};
pub use error::{DesktopError, DesktopResult};

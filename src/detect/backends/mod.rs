pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedDetector;

#[cfg(feature = "backend-tract")]
pub use tract::TractDetector;

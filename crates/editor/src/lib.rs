//! Montage Editor
//!
//! Holds the live clip list for one user and keeps a rendered preview of
//! it current. Every edit cancels the preview job in flight and starts a
//! new one; results from superseded jobs are dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 EditorSession                 │
//! │  clips + selection         Shared (Mutex)     │
//! │        │                   state, seq,        │
//! │        │ snapshot          preview, error     │
//! │        ▼                        ▲             │
//! │  ┌──────────────┐   status  ┌───┴─────────┐   │
//! │  │ExportPipeline│──────────►│ job watcher │───┼──► SessionEvent
//! │  └──────────────┘           └─────────────┘   │
//! └───────────────────────────────────────────────┘
//! ```

pub mod session;

pub use session::*;

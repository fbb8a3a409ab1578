//! Page summarizer — background job orchestration for summarization,
//! language detection and translation.
//!
//! # Modules
//!
//! | Module     | Role                                                       |
//! |------------|------------------------------------------------------------|
//! | `config`   | TOML settings and platform paths                           |
//! | `provider` | Capability providers (trait, HTTP backend, prompts, wire)  |
//! | `store`    | Observable key/value store with atomic merges              |
//! | `job`      | Job state machines, orchestrator, detect → translate chain |
//! | `extract`  | Page text sources and the input gate                       |
//! | `render`   | Status lines and result formatting for observers           |

pub mod config;
pub mod extract;
pub mod job;
pub mod provider;
pub mod render;
pub mod store;

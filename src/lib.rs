//! Palaver: drive multi-vendor LLM conversations written in chat markup.
//!
//! A conversation is plain text split into role-tagged messages. Directives
//! inside it import other chats, inline files, run tasks, register tools and
//! set run options. The resolved conversation is sent to a backend (OpenAI
//! chat or responses, Anthropic, Ollama) and tool calls are dispatched until
//! the model answers.
//!
//! # Quick Start
//!
//! ```no_run
//! use palaver::prelude::*;
//!
//! # async fn example() -> palaver::error::Result<()> {
//! let chat = "
//! system: You are terse.
//!
//! user: Name a prime larger than 10.
//! ";
//! let answer = palaver::ask(chat, AskOptions::new()).await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod ask;
pub mod config;
pub mod error;
pub mod markup;
pub mod options;
pub mod orchestrator;
pub mod prelude;
pub mod provider;
pub mod resolve;
pub mod tools;
pub mod types;
pub mod util;

pub use ask::{ask, ask_completion, ask_messages, run_conversation, AskOptions};

//! mailwatch — single-mailbox IMAP watcher with sender-based dispatch.

pub mod audit;
pub mod config;
pub mod error;
pub mod imap;
pub mod mailer;
pub mod message;
pub mod policy;
pub mod poller;
pub mod processor;

//! Shared fixtures for the engine suites.

#![allow(dead_code)]

use std::sync::Arc;

use mailkeeper_core::{Engine, Entity, ImapProperties, MailSession, SessionContext, StaticDirectory};
use mailkeeper_imap::mock::{MockServer, MockTransport};

pub fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with("alice", Entity::user(1))
        .with("bob", Entity::user(2))
        .with("carol", Entity::user(3))
        .with("staff", Entity::group(10))
}

pub fn engine(props: ImapProperties) -> Arc<Engine> {
    Engine::new(props, Arc::new(directory()))
}

pub fn context(session: &str) -> SessionContext {
    SessionContext::new("acc-1", session, "alice")
}

pub fn session(engine: &Arc<Engine>, server: &MockServer) -> MailSession<MockTransport> {
    engine.open_session(context("s-1"), server.connect())
}

/// A server with a special-use trash folder and a `Work` folder.
pub fn server() -> MockServer {
    let server = MockServer::new();
    server
        .add_special_mailbox("Trash", mailkeeper_imap::SpecialUse::Trash)
        .add_mailbox("Work");
    server
}

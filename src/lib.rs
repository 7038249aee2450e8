//! Real-time collaboration coordinator for the canvas editor.
//!
//! Clients connect over a websocket, join a room per page, take advisory
//! locks on elements and relay edits and presence to the other members.
//! All coordination state lives in [`collab::Coordinator`], which runs on a
//! single task behind [`collab::CoordinatorHandle`].

pub mod auth;
pub mod collab;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;

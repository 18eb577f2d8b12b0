//! A compiled, disk-cached template engine.
//!
//! Template source is rewritten into a compact artifact by a fixed
//! sequence of passes, the artifact is cached against the modification
//! time of the source, and rendering executes the artifact against a
//! [`Store`] of values.
//!
//! Templates mix plain text with echoes and directives:
//!
//! ```text
//! @extends('layout')
//!
//! @section('body')
//! <ul>
//! @foreach ($users as $user)
//!     <li>{{ $loop->iteration }}: {{ $user->name }}</li>
//! @endforeach
//! </ul>
//! @stop
//! ```
//!
//! # Usage
//!
//! ```
//! use vireo::{Engine, Store};
//!
//! let mut engine = Engine::default();
//! engine.add_template("greet", "Hello {{ $name }}!");
//!
//! let store = Store::new().with_must("name", "World");
//! assert_eq!(engine.render("greet", &store).unwrap(), "Hello World!");
//! ```
//!
//! Production setups usually resolve templates from a directory and keep
//! artifacts on disk, so a warm cache survives restarts:
//!
//! ```no_run
//! use vireo::{Cache, Engine, FileResolver, Store};
//!
//! let engine = Engine::default()
//!     .with_resolver(Box::new(FileResolver::new("views")))
//!     .with_cache(Cache::file("cache/views"));
//!
//! let html = engine.render("pages.home", &Store::new()).unwrap();
//! ```

mod cache;
mod compile;
mod directive;
mod engine;
mod pipe;
mod region;
mod render;
mod resolve;
mod store;

pub mod log;

pub use cache::{Artifact, Cache, FileStorage, MemoryStorage, Storage};
pub use compile::{SetExtension, Transform};
pub use directive::Handler;
pub use engine::Engine;
pub use log::Error;
pub use region::Region;
pub use resolve::{FileResolver, MemoryResolver, Resolver, Source};
pub use store::Store;

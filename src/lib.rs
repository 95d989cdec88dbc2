//! Decoders for a family of proprietary game-asset formats (AAR archives,
//! QNT images, POL models, MOT motions) and a renderer-neutral scene
//! assembler built on top of them.
//!
//! The five parse entry points are [`formats::aar::AarArchive::open`],
//! [`formats::qnt::decode`], [`formats::pol::decode`], [`formats::mot::decode`],
//! and [`formats::opr::decode`]; [`scene::builder::build_scene`] ties a
//! parsed model together with a [`io::BlobSource`] into a [`scene::Scene`].

pub mod byte_cursor;
pub mod error;
pub mod formats;
pub mod fs_source;
pub mod image;
pub mod inflate;
pub mod io;
pub mod logger;
pub mod math;
pub mod scene;

pub use error::{Error, ErrorKind, Result};
pub use image::Image;

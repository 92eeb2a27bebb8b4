//! bc-dl: download Bandcamp releases and file them into a tagged music library.
//!
//! ## Pipeline (per release url)
//! 1. **Metadata**: fetch the release page and parse artist, album, year, cover
//!    url and track list, reporting every malformed field at once.
//! 2. **Destination**: `<library>/<artist>/[<year>] <album>`; an existing
//!    directory is never reused.
//! 3. **Files**: run the downloader inside the new directory (`download`) or
//!    pick up audio files from the library root (`tag-files`).
//! 4. **Reconcile**: match files to tracks by name or by embedded tags.
//! 5. **Tag**: write tags and cover, rename to `NN - Title.ext`.
//!
//! Any failure after the directory is created removes it again.

pub mod album;
pub mod classify;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod html;
pub mod http;
pub mod lifecycle;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod tags;
pub mod validation;

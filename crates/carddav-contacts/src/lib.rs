//! carddav-contacts: vCard conversion for CardDAV addressbooks
//!
//! This crate converts between the vCard 3.0 wire format exchanged with a
//! CardDAV server and the flat local record kept by the addressbook.
//!
//! ## Features
//!
//! - vCard parsing and serialization (folding, escaping, grouping tokens)
//! - Subtype resolution with `X-ABLABEL` vendor labels, persisted per addressbook
//! - External photo download and `X-ABCROP-RECTANGLE` cropping
//! - Display name synthesis for records without an explicit name
//!
//! ## Usage
//!
//! ```rust,ignore
//! use carddav_contacts::{CardConverter, HttpDownloader, parse_vcard};
//! use carddav_core::{Config, SqliteSubtypeStore};
//! use std::sync::Arc;
//!
//! let config = Config::load()?;
//! let store = Arc::new(SqliteSubtypeStore::new(&config.database.db_path)?);
//! let mut converter = CardConverter::from_config(&config, store)?;
//! let downloader = HttpDownloader::new(&config.http)?;
//!
//! let mut card = parse_vcard(&text)?;
//! let conversion = converter.vcard_to_record(&mut card, &downloader).await;
//!
//! // Write the record back into the same card
//! converter.update_vcard(&conversion.record, &mut card);
//! println!("{}", card);
//! ```

pub mod client;
pub mod converter;
pub mod display;
pub mod error;
pub mod labels;
pub mod models;
pub mod photo;
pub mod vcard;

pub use client::{HttpDownloader, Resource, ResourceDownloader};
pub use converter::{CardConverter, Conversion};
pub use display::{compose_display_name, determine_show_as};
pub use error::{ContactsError, Result};
pub use labels::{LabelResolver, SubtypeCatalog};
pub use models::{FieldValue, LocalRecord, MultiField, PostalAddress};
pub use photo::{CropRect, PhotoCropper, PhotoHandler};
#[cfg(feature = "image")]
pub use photo::RasterCropper;
pub use vcard::{Property, VCard, parse_vcard, parse_vcards};

/// Re-export the conversion types for easy use
pub mod prelude {
    pub use super::{CardConverter, FieldValue, LocalRecord, PostalAddress, VCard, parse_vcard};
}

/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Busta, an email protocol engine library.
 *
 * Busta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Busta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Busta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! MIME parsing and generation (RFCs 2045-2047, 2231) with
//! Quoted-Printable and Base64 transfer encodings.

pub mod base64;
mod builder;
pub mod charset;
mod content_type;
mod header;
mod message;
pub mod quoted_printable;
pub mod rfc2047;

pub use builder::{AttachmentPart, MessageBuilder};
pub use content_type::{
    is_boundary_char, is_token, is_token_char, is_valid_boundary, parse_content_disposition,
    parse_content_type, ContentDisposition, ContentType, Parameter,
};
pub use header::{emit_headers, parse_headers, Header};
pub use message::{Body, MimeMessage};

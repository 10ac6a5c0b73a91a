//! # modkit-fetch-macros
//!
//! Procedural macros for `modkit-fetch`.
//!
//! ## `#[derive(QueryEncode)]`
//!
//! Implements `modkit_fetch::QueryEncode` for a struct with named fields,
//! turning it into query-string pairs at compile time instead of inspecting
//! fields at runtime.
//!
//! ```ignore
//! use modkit_fetch::QueryEncode;
//!
//! #[derive(QueryEncode)]
//! pub struct Search {
//!     #[query(rename = "q")]
//!     pub text: String,
//!     #[query(omitempty)]
//!     pub cursor: Option<String>,
//!     #[query(skip)]
//!     pub debug: bool,
//!     #[query(squash)]
//!     pub page: Page,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod query_encode;

/// Derive `modkit_fetch::QueryEncode`.
///
/// Only `pub` fields are encoded, in declaration order. The key defaults to
/// the field name lower-cased.
///
/// # Field attributes
///
/// - `#[query(rename = "key")]` - explicit key
/// - `#[query(omitempty)]` - skip the field when its string form is empty
/// - `#[query(skip)]` - never encode the field
/// - `#[query(squash)]` - inline the field's own pairs (its type must implement `QueryEncode`)
#[proc_macro_derive(QueryEncode, attributes(query))]
pub fn derive_query_encode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    query_encode::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

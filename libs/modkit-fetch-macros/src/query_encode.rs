use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Field, Fields, LitStr, Visibility};

const ALLOWED_KEYS: &[&str] = &["rename", "omitempty", "skip", "squash"];

/// Parsed `#[query(...)]` options of one field.
#[derive(Default)]
struct FieldOptions {
    rename: Option<LitStr>,
    omitempty: bool,
    skip: bool,
    squash: bool,
}

fn parse_field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("query")) {
        attr.parse_nested_meta(|meta| {
            let duplicate = || meta.error("duplicate query option");
            if meta.path.is_ident("rename") {
                if options.rename.is_some() {
                    return Err(duplicate());
                }
                options.rename = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("omitempty") {
                if options.omitempty {
                    return Err(duplicate());
                }
                options.omitempty = true;
            } else if meta.path.is_ident("skip") {
                if options.skip {
                    return Err(duplicate());
                }
                options.skip = true;
            } else if meta.path.is_ident("squash") {
                if options.squash {
                    return Err(duplicate());
                }
                options.squash = true;
            } else {
                let name = meta
                    .path
                    .get_ident()
                    .map_or_else(String::new, ToString::to_string);
                return Err(meta.error(format!(
                    "unknown query option '{name}'; expected one of: {}",
                    ALLOWED_KEYS.join(", ")
                )));
            }
            Ok(())
        })?;
    }

    if options.skip && (options.rename.is_some() || options.omitempty || options.squash) {
        return Err(syn::Error::new(
            field.span(),
            "`skip` cannot be combined with other query options",
        ));
    }
    if options.squash && (options.rename.is_some() || options.omitempty) {
        return Err(syn::Error::new(
            field.span(),
            "`squash` ignores the field name; remove `rename`/`omitempty`",
        ));
    }

    Ok(options)
}

/// Default key: the field name lower-cased, without a raw-identifier prefix.
fn default_key(field: &Field) -> String {
    field
        .ident
        .as_ref()
        .map(|ident| {
            let name = ident.to_string();
            name.strip_prefix("r#").unwrap_or(&name).to_lowercase()
        })
        .unwrap_or_default()
}

fn expand_field(field: &Field) -> syn::Result<TokenStream> {
    let options = parse_field_options(field)?;

    if options.skip || !matches!(field.vis, Visibility::Public(_)) {
        return Ok(TokenStream::new());
    }

    let ident = &field.ident;

    if options.squash {
        return Ok(quote! {
            ::modkit_fetch::QueryEncode::append_pairs(&self.#ident, values)?;
        });
    }

    let key = options
        .rename
        .map_or_else(|| default_key(field), |lit| lit.value());

    if options.omitempty {
        Ok(quote! {
            let value = ::modkit_fetch::QueryValue::to_query_value(&self.#ident);
            if !value.is_empty() {
                values.add(#key, value);
            }
        })
    } else {
        Ok(quote! {
            values.add(#key, ::modkit_fetch::QueryValue::to_query_value(&self.#ident));
        })
    }
}

pub fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(QueryEncode)] can only be applied to structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "#[derive(QueryEncode)] requires a struct with named fields",
        ));
    };

    let mut body = TokenStream::new();
    let mut errors: Option<syn::Error> = None;
    for field in &fields.named {
        match expand_field(field) {
            Ok(tokens) => body.extend(tokens),
            Err(err) => match errors.as_mut() {
                Some(existing) => existing.combine(err),
                None => errors = Some(err),
            },
        }
    }
    if let Some(err) = errors {
        return Err(err);
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::modkit_fetch::QueryEncode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn append_pairs(
                &self,
                values: &mut ::modkit_fetch::QueryValues,
            ) -> ::core::result::Result<(), ::modkit_fetch::HttpError> {
                #body
                ::core::result::Result::Ok(())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand_str(input: &DeriveInput) -> String {
        expand(input).unwrap().to_string()
    }

    #[test]
    fn test_default_key_is_lowercased() {
        let input: DeriveInput = parse_quote! {
            struct Page { pub Limit: u32 }
        };
        let out = expand_str(&input);
        assert!(out.contains("\"limit\""), "{out}");
    }

    #[test]
    fn test_rename_is_used() {
        let input: DeriveInput = parse_quote! {
            struct Tagged {
                #[query(rename = "foo_bar")]
                pub foo: String,
            }
        };
        let out = expand_str(&input);
        assert!(out.contains("\"foo_bar\""));
        assert!(!out.contains("\"foo\""));
    }

    #[test]
    fn test_private_and_skipped_fields_emit_nothing() {
        let input: DeriveInput = parse_quote! {
            struct Hidden {
                secret: String,
                #[query(skip)]
                pub ignored: String,
            }
        };
        let out = expand_str(&input);
        assert!(!out.contains("secret"));
        assert!(!out.contains("ignored"));
    }

    #[test]
    fn test_squash_delegates_to_field() {
        let input: DeriveInput = parse_quote! {
            struct Outer {
                #[query(squash)]
                pub inner: Inner,
            }
        };
        let out = expand_str(&input);
        assert!(out.contains("append_pairs (& self . inner , values)"), "{out}");
    }

    #[test]
    fn test_omitempty_checks_value() {
        let input: DeriveInput = parse_quote! {
            struct Opt {
                #[query(omitempty)]
                pub cursor: String,
            }
        };
        assert!(expand_str(&input).contains("is_empty"));
    }

    #[test]
    fn test_raw_identifier_prefix_is_stripped() {
        let input: DeriveInput = parse_quote! {
            struct Raw { pub r#type: String }
        };
        assert!(expand_str(&input).contains("\"type\""));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[query(flatten)]
                pub inner: String,
            }
        };
        let err = expand(&input).unwrap_err().to_string();
        assert!(err.contains("unknown query option 'flatten'"), "{err}");
    }

    #[test]
    fn test_duplicate_option_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[query(omitempty, omitempty)]
                pub inner: String,
            }
        };
        assert!(expand(&input).unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_skip_conflicts_with_rename() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[query(skip, rename = "x")]
                pub inner: String,
            }
        };
        assert!(expand(&input).is_err());
    }

    #[test]
    fn test_enums_are_rejected() {
        let input: DeriveInput = parse_quote! {
            enum NotAStruct { A }
        };
        let err = expand(&input).unwrap_err().to_string();
        assert!(err.contains("can only be applied to structs"));
    }

    #[test]
    fn test_tuple_structs_are_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Tuple(pub u8);
        };
        assert!(expand(&input).unwrap_err().to_string().contains("named fields"));
    }

    #[test]
    fn test_generics_are_forwarded() {
        let input: DeriveInput = parse_quote! {
            struct Wrapper<T: Clone> { pub value: T }
        };
        let out = expand_str(&input);
        assert!(out.contains("impl < T : Clone >"), "{out}");
    }
}

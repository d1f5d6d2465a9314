//! Derive macro for sqlrow records.
//!
//! `#[derive(Record)]` on a struct with named fields emits its static
//! `RecordShape` and positional read and write access. Field attributes:
//!
//! ```ignore
//! #[derive(Record)]
//! pub struct User {
//!     #[sql("pk autoincr")]
//!     pub id: i64,
//!     #[sql("'user name'")]
//!     pub name: String,
//!     #[sql(flatten)]
//!     pub audit: Audit,
//!     #[sql("json")]
//!     pub tags: Vec<String>,
//!     #[sql("-")]
//!     pub cached: Option<Session>,
//! }
//! ```
//!
//! Tags are kept as written and parsed at runtime. The macro only looks at
//! them to keep ignored and JSON fields away from `FieldType`, which their
//! types need not implement. JSON fields are read back through serde, so
//! their types implement `Serialize` and `DeserializeOwned`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, Ident, LitStr, Token, Visibility};

/// One item of `#[sql(...)]`.
enum FieldAttr {
    Tag(LitStr),
    Flatten,
}

impl Parse for FieldAttr {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(FieldAttr::Tag(input.parse()?));
        }
        let ident: Ident = input.parse()?;
        if ident == "flatten" {
            Ok(FieldAttr::Flatten)
        } else {
            Err(syn::Error::new(
                ident.span(),
                "expected a tag string or `flatten`",
            ))
        }
    }
}

#[derive(Default)]
struct FieldOptions {
    tag: Option<LitStr>,
    flatten: bool,
}

impl FieldOptions {
    fn from_field(field: &Field) -> syn::Result<Self> {
        let mut options = FieldOptions::default();

        for attr in field.attrs.iter().filter(|a| a.path().is_ident("sql")) {
            let items = attr.parse_args_with(Punctuated::<FieldAttr, Token![,]>::parse_terminated)?;
            for item in items {
                match item {
                    FieldAttr::Tag(lit) => {
                        if options.tag.is_some() {
                            return Err(syn::Error::new(lit.span(), "duplicate sql tag"));
                        }
                        options.tag = Some(lit);
                    }
                    FieldAttr::Flatten => options.flatten = true,
                }
            }
        }

        Ok(options)
    }

    fn tag_text(&self) -> String {
        self.tag.as_ref().map(LitStr::value).unwrap_or_default()
    }
}

/// A leading `-` marks an ignored field.
fn is_ignored(tag: &str) -> bool {
    tag.trim_start().starts_with('-')
}

/// Whether the tag carries the `json`/`jsonb` keyword. Quoted names are
/// skipped, as the runtime tag scanner treats them as a single name.
fn is_json(tag: &str) -> bool {
    tag_words(tag)
        .iter()
        .any(|word| word.eq_ignore_ascii_case("json") || word.eq_ignore_ascii_case("jsonb"))
}

/// Bare words of a tag, outside any `'...'`, `"..."`, `` `...` `` or
/// `[...]` quoted form.
fn tag_words(tag: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut chars = tag.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let close = match c {
            '\'' | '"' | '`' => Some(c),
            '[' => Some(']'),
            _ => None,
        };
        if let Some(close) = close {
            for (_, inner) in chars.by_ref() {
                if inner == close {
                    break;
                }
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(i, next)) = chars.peek() {
                if !(next.is_alphanumeric() || next == '_') {
                    break;
                }
                end = i + next.len_utf8();
                chars.next();
            }
            words.push(&tag[start..end]);
        }
    }

    words
}

/// Derive `Record`, `FieldAccess` and `FieldType` for a struct.
#[proc_macro_derive(Record, attributes(sql))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_record(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let record_name = name.unraw().to_string();

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut shapes = Vec::with_capacity(fields.len());
    let mut arms = Vec::with_capacity(fields.len());
    let mut set_arms = Vec::with_capacity(fields.len());
    let mut blanks = Vec::with_capacity(fields.len());
    // Only records made entirely of `FieldType` fields can be created blank.
    let mut blankable = true;

    for (position, field) in fields.iter().enumerate() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let options = FieldOptions::from_field(field)?;
        let tag = options.tag_text();
        let ignored = is_ignored(&tag);
        let json = !ignored && is_json(&tag);
        let flatten = options.flatten && !ignored;
        let public = !matches!(field.vis, Visibility::Inherited);
        let field_name = ident.unraw().to_string();

        if flatten && json {
            return Err(syn::Error::new_spanned(
                ident,
                "a flattened field cannot be stored as json",
            ));
        }

        let type_shape = if ignored {
            quote!(::sqlrow::record::TypeShape::INTERFACE)
        } else if json {
            quote!(::sqlrow::record::TypeShape::SERIALIZED)
        } else {
            quote!(<#ty as ::sqlrow::record::FieldType>::SHAPE)
        };

        shapes.push(quote! {
            ::sqlrow::record::FieldShape {
                name: #field_name,
                tag: #tag,
                public: #public,
                embedded: #flatten,
                ty: #type_shape,
            }
        });

        if ignored {
            blankable = false;
            continue;
        }
        if json {
            blankable = false;
            arms.push(quote! {
                #position => ::sqlrow::record::FieldRef::json(&self.#ident)
            });
            set_arms.push(quote! {
                ::core::option::Option::Some((&#position, rest)) => {
                    ::sqlrow::record::assign_json(&mut self.#ident, rest, value)
                }
            });
        } else {
            arms.push(quote! {
                #position => ::sqlrow::record::FieldType::field_ref(&self.#ident)
            });
            set_arms.push(quote! {
                ::core::option::Option::Some((&#position, rest)) => {
                    ::sqlrow::record::FieldType::assign(&mut self.#ident, rest, value)
                }
            });
            blanks.push(quote! {
                #ident: <#ty as ::sqlrow::record::FieldType>::blank()?
            });
        }
    }

    let blank = if blankable {
        quote! {
            fn blank() -> ::core::option::Option<Self> {
                ::core::option::Option::Some(#name { #(#blanks,)* })
            }
        }
    } else {
        TokenStream2::new()
    };

    Ok(quote! {
        impl ::sqlrow::record::FieldAccess for #name {
            fn field(
                &self,
                position: usize,
            ) -> ::sqlrow::error::SqlRowResult<::sqlrow::record::FieldRef<'_>> {
                match position {
                    #(#arms,)*
                    _ => ::core::result::Result::Err(::sqlrow::error::SqlRowError::TypeShape(
                        ::std::format!("{} has no readable field at position {}", #record_name, position),
                    )),
                }
            }

            fn set_field(
                &mut self,
                index: &[usize],
                value: ::sqlrow::value::Value,
            ) -> ::sqlrow::error::SqlRowResult<()> {
                match index.split_first() {
                    #(#set_arms)*
                    _ => ::core::result::Result::Err(::sqlrow::error::SqlRowError::TypeShape(
                        ::std::format!("{} has no writable field at {:?}", #record_name, index),
                    )),
                }
            }
        }

        impl ::sqlrow::record::Record for #name {
            const SHAPE: &'static ::sqlrow::record::RecordShape = &::sqlrow::record::RecordShape {
                name: #record_name,
                fields: &[#(#shapes),*],
            };
        }

        impl ::sqlrow::record::FieldType for #name {
            const SHAPE: ::sqlrow::record::TypeShape = ::sqlrow::record::TypeShape::record(
                <#name as ::sqlrow::record::Record>::SHAPE,
            );

            fn field_ref(
                &self,
            ) -> ::sqlrow::error::SqlRowResult<::sqlrow::record::FieldRef<'_>> {
                ::core::result::Result::Ok(::sqlrow::record::FieldRef::Record(self))
            }

            fn assign(
                &mut self,
                path: &[usize],
                value: ::sqlrow::value::Value,
            ) -> ::sqlrow::error::SqlRowResult<()> {
                ::sqlrow::record::FieldAccess::set_field(self, path, value)
            }

            #blank
        }
    })
}

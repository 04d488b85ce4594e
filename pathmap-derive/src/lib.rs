use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// Derive macro for the `Codec` trait.
///
/// Declares the archive extension of a leaf type and how its values are
/// encoded. Without `with`, values are encoded as CBOR, which requires the
/// type to implement `serde::Deserialize` as well.
///
/// # Example
///
/// ```ignore
/// use pathmap_core::Codec;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Codec)]
/// #[codec(ext = "point")]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
/// ```
///
/// # Attributes
///
/// - `#[codec(ext = "...")]` - Extension of archive entries (required, leading dot optional)
/// - `#[codec(with = "module")]` - Use `module::encode(&T)` and `module::decode(&[u8])`
///   instead of CBOR. Their error types must convert into `pathmap_core::BoxError`.
#[proc_macro_derive(Codec, attributes(codec))]
pub fn derive_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_codec_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_codec_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let attrs = parse_codec_attrs(&input.attrs)?;
    let ext = attrs.ext.ok_or_else(|| {
        syn::Error::new_spanned(name, "Codec requires #[codec(ext = \"...\")]")
    })?;
    let extension = if ext.value().starts_with('.') {
        ext.value()
    } else {
        format!(".{}", ext.value())
    };

    let (encode, decode) = match &attrs.with {
        Some(module) => (
            quote! { #module::encode(self).map_err(::std::convert::Into::into) },
            quote! { #module::decode(bytes).map_err(::std::convert::Into::into) },
        ),
        None => (
            quote! { ::pathmap_core::codec::cbor_encode(self) },
            quote! { ::pathmap_core::codec::cbor_decode(bytes) },
        ),
    };

    Ok(quote! {
        impl #impl_generics ::pathmap_core::Codec for #name #ty_generics #where_clause {
            const EXTENSION: &'static str = #extension;

            fn encode(
                &self,
            ) -> ::std::result::Result<::std::vec::Vec<u8>, ::pathmap_core::BoxError> {
                #encode
            }

            fn decode(bytes: &[u8]) -> ::std::result::Result<Self, ::pathmap_core::BoxError> {
                #decode
            }
        }
    })
}

#[derive(Default)]
struct CodecAttrs {
    ext: Option<syn::LitStr>,
    with: Option<syn::Path>,
}

fn parse_codec_attrs(attrs: &[syn::Attribute]) -> syn::Result<CodecAttrs> {
    let mut result = CodecAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("codec") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ext") {
                let value: syn::LitStr = meta.value()?.parse()?;
                if value.value().trim_start_matches('.').is_empty() {
                    return Err(meta.error("extension must not be empty"));
                }
                result.ext = Some(value);
            } else if meta.path.is_ident("with") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.with = Some(value.parse()?);
            } else {
                return Err(meta.error("unsupported codec attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

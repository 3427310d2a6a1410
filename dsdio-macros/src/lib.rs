use darling::Error;
use darling::ast::NestedMeta;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, ItemStruct, parse_macro_input};

use proc_macro::TokenStream;

/// Serializes every field in declaration order, in both byte orders.
#[proc_macro_derive(ToBytes)]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let fields: Vec<syn::Member> = match input.data {
        Data::Struct(ref s) => match s.fields {
            Fields::Named(ref nf) => nf
                .named
                .iter()
                .filter_map(|f| f.ident.clone())
                .map(Into::into)
                .collect(),
            Fields::Unnamed(ref uf) => uf
                .unnamed
                .iter()
                .enumerate()
                .map(|(i, _)| syn::Index::from(i).into())
                .collect(),
            Fields::Unit => Vec::new(),
        },
        _ => {
            return TokenStream::from(
                syn::Error::new_spanned(&name, "ToBytes can only be derived for structs")
                    .to_compile_error(),
            );
        }
    };

    let expanded = quote! {
        impl crate::utils::byteorder::WriteBytesBe for #name {
            fn write_be(&self, dst: &mut Vec<u8>) {
                #( crate::utils::byteorder::WriteBytesBe::write_be(&self.#fields, dst); )*
            }
        }

        impl crate::utils::byteorder::WriteBytesLe for #name {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::utils::byteorder::WriteBytesLe::write_le(&self.#fields, dst); )*
            }
        }
    };

    TokenStream::from(expanded)
}

/// Marks a big-endian record as the body of a DSDIFF chunk, e.g. `#[dff_chunk(b"FS  ")]`.
#[proc_macro_attribute]
pub fn dff_chunk(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_chunk(
        attr,
        item,
        quote!(crate::dff::DffChunk),
        quote!(crate::utils::byteorder::WriteBytesBe::write_be),
    )
}

/// Marks a little-endian record as the body of a DSF chunk, e.g. `#[dsf_chunk(b"fmt ")]`.
#[proc_macro_attribute]
pub fn dsf_chunk(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_chunk(
        attr,
        item,
        quote!(crate::dsf::DsfChunk),
        quote!(crate::utils::byteorder::WriteBytesLe::write_le),
    )
}

fn expand_chunk(
    attr: TokenStream,
    item: TokenStream,
    chunk_trait: TokenStream2,
    write_fn: TokenStream2,
) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let Some(first) = args.first() else {
        return TokenStream::from(
            syn::Error::new(
                proc_macro2::Span::call_site(),
                "chunk attribute expects a byte string, e.g. b\"PROP\"",
            )
            .to_compile_error(),
        );
    };

    let id_bytes = match first {
        NestedMeta::Lit(syn::Lit::ByteStr(bs)) => bs.value(),
        other => {
            return TokenStream::from(
                syn::Error::new_spanned(other, "chunk id must be a byte string, e.g. b\"PROP\"")
                    .to_compile_error(),
            );
        }
    };

    if id_bytes.len() != 4 {
        return TokenStream::from(
            syn::Error::new_spanned(first, "chunk id must be exactly 4 bytes").to_compile_error(),
        );
    }
    let id_tokens = {
        let b = id_bytes;
        quote! {[#(#b),*]}
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl #chunk_trait for #name {
            const ID: crate::chunk::ChunkId = crate::chunk::ChunkId(#id_tokens);

            fn chunk_data(&self) -> Vec<u8> {
                let mut vec = Vec::new();
                #write_fn(self, &mut vec);
                vec
            }
        }
    };
    TokenStream::from(expanded)
}

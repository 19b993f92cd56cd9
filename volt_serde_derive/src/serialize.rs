use proc_macro::TokenStream;
use quote::quote;
use syn::{self};

pub fn impl_ser_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    match ast.data {
        syn::Data::Struct(ref data) => {
            let statements: Vec<quote::__private::TokenStream> = data
                .fields
                .iter()
                .zip(0..1_000_000)
                .map(|(field, index)| serialize_field(field, index))
                .collect();

            let expanded = quote! {
                impl WireSerialize for #name {
                    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
                    where
                        W: std::io::Write,
                    {
                        #(#statements)*
                        Ok(())
                    }
                }
            };
            TokenStream::from(expanded)
        }
        // Enums carry wire tags that the derive can't guess; implement those by hand.
        _ => unimplemented!("WireSerialize can only be derived for structs"),
    }
}

fn serialize_field(field: &syn::Field, index: usize) -> quote::__private::TokenStream {
    match field.ident.clone() {
        Some(id) => quote! { self.#id.wire_serialize(&mut target)?; },
        None => {
            let index = syn::Index::from(index);
            quote! { self.#index.wire_serialize(&mut target)?; }
        }
    }
}

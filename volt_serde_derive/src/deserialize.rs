use proc_macro::TokenStream;
use quote::quote;
use syn;

pub fn impl_deser_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let data = match ast.data {
        syn::Data::Struct(ref data) => data,
        _ => unimplemented!("WireDeserialize can only be derived for structs"),
    };
    let is_tuple_struct = matches!(data.fields, syn::Fields::Unnamed(_));
    let statements: Vec<quote::__private::TokenStream> = data
        .fields
        .iter()
        .zip(0..1_000_000)
        .map(|(field, index)| deserialize_field(field, index))
        .collect();

    let expanded = if is_tuple_struct {
        quote! {
            impl WireDeserialize for #name {
                fn wire_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name (
                        #(#statements)*
                    ))
                }
            }
        }
    } else {
        quote! {
            impl WireDeserialize for #name {
                fn wire_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name {
                        #(#statements)*
                    })
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field, _index: usize) -> quote::__private::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(name) => {
            quote! { #name: <#ty as WireDeserialize>::wire_deserialize(&mut target)?, }
        }
        None => {
            quote! { <#ty as WireDeserialize>::wire_deserialize(&mut target)?, }
        }
    }
}

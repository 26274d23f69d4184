//! Provides derive macros for `tele::HasDependencies`.
use quote::quote;
use syn::{Data, DataStruct, DeriveInput, Fields, FieldsNamed};

/// Returns the fields that contribute dependencies, leaving out any
/// marked with `#[tele(skip)]`.
fn get_dependency_fields(input: &DeriveInput) -> syn::Result<Vec<syn::Ident>> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(FieldsNamed { named, .. }),
            ..
        }) => named,
        Data::Struct(DataStruct {
            fields: Fields::Unit,
            ..
        }) => return Ok(vec![]),
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "deriving HasDependencies only supports structs with named fields".to_string(),
            ));
        }
    };

    let mut idents = vec![];
    'outer: for field in fields.iter() {
        // UNWRAP: safe because we only support structs with named fields
        let ident = field.ident.clone().unwrap();
        for att in field.attrs.iter() {
            if !att.path().is_ident("tele") {
                continue;
            }
            let mut skip = false;
            att.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error(format!(
                        "unsupported field attribute {:?} - must be 'skip'",
                        meta.path
                            .get_ident()
                            .map(|id| id.to_string())
                            .unwrap_or("unknown".to_string())
                    )))
                }
            })?;
            if skip {
                continue 'outer;
            }
        }
        idents.push(ident);
    }
    Ok(idents)
}

#[proc_macro_derive(HasDependencies, attributes(tele))]
pub fn derive_has_dependencies(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input: DeriveInput = syn::parse_macro_input!(input);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let idents = match get_dependency_fields(&input) {
        Ok(idents) => idents,
        Err(e) => return e.into_compile_error().into(),
    };

    let output = quote! {
        impl #impl_generics tele::HasDependencies for #name #ty_generics #where_clause {
            fn dependencies(&self) -> tele::Dependencies {
                tele::Dependencies::default()
                    #(.merge(tele::HasDependencies::dependencies(&self.#idents)))*
            }
        }
    };
    output.into()
}

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod process_meta;
use process_meta::{parse_config_fields, parse_process_info};

/// Registers a process type with the framepipe process registry.
///
/// Every field tagged `#[config(...)]` becomes an entry of the generated
/// config schema; the struct must implement `Default` and `Process`.
#[proc_macro_derive(ProcessMeta, attributes(process_meta, config))]
pub fn derive_process_meta(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let info = match parse_process_info(&input) {
        Ok(info) => info,
        Err(e) => return e.write_errors().into(),
    };

    let fields = match parse_config_fields(&input) {
        Ok(fields) => fields,
        Err(e) => return e.write_errors().into(),
    };

    let struct_name = &input.ident;
    let type_name = &info.name;
    let category = &info.category;
    let description = info.description.clone().unwrap_or_default();

    let entries = fields.iter().filter_map(|f| {
        let key = f.ident.as_ref()?.to_string();
        let value_type = extract_type_name(&f.ty);
        let default = &f.default;
        let field_description = &f.description;
        let min = option_tokens(f.min);
        let max = option_tokens(f.max);

        Some(quote! {
            crate::registry::ConfigSchema {
                key: #key.to_string(),
                value_type: #value_type.to_string(),
                default: #default.to_string(),
                description: #field_description.to_string(),
                min: #min,
                max: #max,
            }
        })
    });

    let lower = struct_name.to_string().to_lowercase();
    let mod_name = syn::Ident::new(&format!("__process_registration_{}", lower), struct_name.span());
    let factory_fn_name = syn::Ident::new(&format!("create_metadata_{}", lower), struct_name.span());

    let expanded = quote! {
        mod #mod_name {
            use super::*;

            fn #factory_fn_name() -> crate::registry::ProcessMetadata {
                crate::registry::ProcessMetadata {
                    type_name: #type_name.to_string(),
                    category: #category.to_string(),
                    description: #description.to_string(),
                    config: vec![#(#entries),*],
                    factory: || Box::new(#struct_name::default()),
                }
            }

            ::inventory::submit! {
                crate::registry::ProcessMetadataFactoryWrapper(#factory_fn_name)
            }
        }
    };

    TokenStream::from(expanded)
}

fn option_tokens(value: Option<f64>) -> proc_macro2::TokenStream {
    match value {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

fn extract_type_name(ty: &syn::Type) -> &'static str {
    let type_str = quote!(#ty).to_string();

    if type_str.contains("f64") || type_str.contains("f32") {
        "number"
    } else if type_str.contains("u32") || type_str.contains("i32")
        || type_str.contains("u64") || type_str.contains("i64")
        || type_str.contains("usize") || type_str.contains("isize") {
        "integer"
    } else if type_str.contains("String") || type_str.contains("str") {
        "string"
    } else if type_str.contains("bool") {
        "boolean"
    } else {
        "unknown"
    }
}

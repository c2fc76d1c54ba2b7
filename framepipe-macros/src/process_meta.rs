use darling::{FromAttributes, FromField};
use syn::{DeriveInput, Fields};

/// Parsed attributes from #[process_meta(...)]
#[derive(Debug, FromAttributes)]
#[darling(attributes(process_meta))]
pub struct ProcessMetaArgs {
    pub name: String,
    pub category: String,

    #[darling(default)]
    pub description: Option<String>,
}

/// Parsed attributes from #[config(...)]
#[derive(Debug, FromField)]
#[darling(attributes(config))]
pub struct ConfigField {
    pub ident: Option<syn::Ident>,
    pub ty: syn::Type,

    /// Default value as configuration text, e.g. "-1.0" or "false".
    #[darling(default)]
    pub default: String,

    #[darling(default)]
    pub description: String,

    #[darling(default)]
    pub min: Option<f64>,

    #[darling(default)]
    pub max: Option<f64>,
}

pub fn parse_process_info(input: &DeriveInput) -> darling::Result<ProcessMetaArgs> {
    ProcessMetaArgs::from_attributes(&input.attrs)
}

pub fn parse_config_fields(input: &DeriveInput) -> darling::Result<Vec<ConfigField>> {
    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return Ok(Vec::new()),
        },
        _ => return Ok(Vec::new()),
    };

    fields
        .iter()
        .filter(|f| f.attrs.iter().any(|attr| attr.path().is_ident("config")))
        .map(ConfigField::from_field)
        .collect()
}

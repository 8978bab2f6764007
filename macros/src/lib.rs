use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input, spanned::Spanned};

/// Derives `crate::entities::Entity` for a plain record struct.
///
/// The struct must carry `#[entity(table = "...")]` and exactly one `i64`
/// field marked `#[entity(key)]`. One `i64` field may be marked
/// `#[entity(version)]` to opt into optimistic concurrency checks. Every other
/// named field becomes a column, in declaration order, and must convert into
/// `crate::storage::SqlValue`.
///
/// ```ignore
/// #[derive(Debug, Clone, FromRow, Entity)]
/// #[entity(table = "trucks")]
/// pub struct Truck {
///     #[entity(key)]
///     pub id: i64,
///     pub plate_number: String,
///     #[entity(version)]
///     pub row_version: i64,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_entity(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    let mut table: Option<LitStr> = None;
    let mut name: Option<LitStr> = None;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `table` or `name`"))
            }
        })?;
    }

    let table = table.ok_or_else(|| {
        syn::Error::new(ident.span(), "#[derive(Entity)] requires #[entity(table = \"...\")]")
    })?;
    let name = name.unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "#[derive(Entity)] only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "#[derive(Entity)] can only be used on structs",
            ));
        }
    };

    let mut key: Option<Ident> = None;
    let mut version: Option<Ident> = None;
    let mut columns: Vec<Ident> = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.clone() else {
            continue;
        };
        let mut is_key = false;
        let mut is_version = false;

        for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    is_key = true;
                    Ok(())
                } else if meta.path.is_ident("version") {
                    is_version = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `key` or `version`"))
                }
            })?;
        }

        match (is_key, is_version) {
            (true, true) => {
                return Err(syn::Error::new(
                    field.span(),
                    "a field cannot be both the key and the version",
                ));
            }
            (true, false) => {
                if key.replace(field_ident).is_some() {
                    return Err(syn::Error::new(field.span(), "only one field may be the key"));
                }
            }
            (false, true) => {
                if version.replace(field_ident).is_some() {
                    return Err(syn::Error::new(
                        field.span(),
                        "only one field may be the version",
                    ));
                }
            }
            (false, false) => columns.push(field_ident),
        }
    }

    let key = key.ok_or_else(|| {
        syn::Error::new(ident.span(), "#[derive(Entity)] requires one #[entity(key)] field")
    })?;
    let key_name = LitStr::new(&key.to_string(), key.span());
    let column_names: Vec<LitStr> = columns
        .iter()
        .map(|c| LitStr::new(&c.to_string(), c.span()))
        .collect();

    let version_items = match &version {
        Some(v) => {
            let v_name = LitStr::new(&v.to_string(), v.span());
            quote! {
                const VERSION: ::core::option::Option<&'static str> =
                    ::core::option::Option::Some(#v_name);

                fn version(&self) -> ::core::option::Option<i64> {
                    ::core::option::Option::Some(self.#v)
                }

                fn set_version(&mut self, version: i64) {
                    self.#v = version;
                }
            }
        }
        None => quote! {},
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics crate::entities::Entity for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const TABLE: &'static str = #table;
            const KEY: &'static str = #key_name;
            const COLUMNS: &'static [&'static str] = &[#(#column_names),*];

            #version_items

            fn key(&self) -> ::core::option::Option<i64> {
                if self.#key == 0 {
                    ::core::option::Option::None
                } else {
                    ::core::option::Option::Some(self.#key)
                }
            }

            fn values(&self) -> ::std::vec::Vec<crate::storage::SqlValue> {
                ::std::vec![
                    #(::core::convert::Into::<crate::storage::SqlValue>::into(
                        ::core::clone::Clone::clone(&self.#columns)
                    )),*
                ]
            }
        }
    })
}

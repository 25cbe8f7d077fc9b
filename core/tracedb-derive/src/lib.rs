//! `define_table!` — function-like proc-macro that generates a concrete
//! table type: a `Row` struct, per-column index constants, a static schema,
//! an `insert` method, and `extend_parent`/`select_and_extend_parent`
//! wrappers, from a small declarative column list.
//!
//! This replaces the text-substitution table-extension macros of the
//! original engine with ordinary Rust code generation — see the Design
//! Notes on macro-generated tables.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Ident, Token, braced, bracketed, parse_macro_input};

struct ColumnDef {
    name: Ident,
    ty: Ident,
    flags: Vec<Ident>,
}

struct TableDef {
    name: Ident,
    columns: Vec<ColumnDef>,
}

impl Parse for ColumnDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        input.parse::<Token![:]>()?;
        let ty: Ident = input.parse()?;
        let flags = if input.peek(syn::token::Bracket) {
            let content;
            bracketed!(content in input);
            let idents: Punctuated<Ident, Token![,]> =
                content.parse_terminated(Ident::parse, Token![,])?;
            idents.into_iter().collect()
        } else {
            Vec::new()
        };
        Ok(ColumnDef { name, ty, flags })
    }
}

impl Parse for TableDef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        let content;
        braced!(content in input);
        let columns: Punctuated<ColumnDef, Token![,]> =
            content.parse_terminated(ColumnDef::parse, Token![,])?;
        Ok(TableDef {
            name,
            columns: columns.into_iter().collect(),
        })
    }
}

/// Rust field type and `Storage`/`ColumnType` variant name for a declared
/// column type identifier (`Int32`, `Uint32`, `Int64`, `Double`, `String`).
fn value_type(ty: &Ident) -> proc_macro2::TokenStream {
    match ty.to_string().as_str() {
        "Int32" => quote! { i32 },
        "Uint32" => quote! { u32 },
        "Int64" => quote! { i64 },
        "Double" => quote! { f64 },
        "String" => quote! { ::tracedb_core::string_pool::StringId },
        other => panic!(
            "define_table!: unknown column type '{other}' (expected Int32, Uint32, Int64, Double or String)"
        ),
    }
}

fn storage_ctor(ty: &Ident, dense: bool, non_null: bool) -> proc_macro2::TokenStream {
    let variant = format_ident!("{}", ty.to_string());
    if non_null {
        quote! { ::tracedb_core::storage::Storage::#variant(::tracedb_core::storage::ColumnStorage::non_null()) }
    } else {
        quote! { ::tracedb_core::storage::Storage::#variant(::tracedb_core::storage::ColumnStorage::nullable(#dense)) }
    }
}

fn column_type_variant(ty: &Ident) -> proc_macro2::TokenStream {
    let variant = format_ident!("{}", ty.to_string());
    quote! { ::tracedb_core::value::ColumnType::#variant }
}

#[proc_macro]
pub fn define_table(input: TokenStream) -> TokenStream {
    let def = parse_macro_input!(input as TableDef);
    let table_ident = def.name;
    let table_name_str = table_ident.to_string();
    let row_ident = format_ident!("{}Row", table_ident);
    let columns_mod = format_ident!("{}_columns", to_snake_case(&table_name_str));

    let mut row_fields = Vec::new();
    let mut insert_calls = Vec::new();
    let mut push_column_calls = Vec::new();
    let mut index_consts = Vec::new();
    let mut schema_columns = Vec::new();

    index_consts.push(quote! { pub const ID: u32 = 0; });

    for (i, col) in def.columns.iter().enumerate() {
        let col_index = (i + 1) as u32;
        let field_name = &col.name;
        let const_name = format_ident!("{}", col.name.to_string().to_uppercase());
        let value_ty = value_type(&col.ty);

        let non_null = col.flags.iter().any(|f| f == "non_null");
        let dense = col.flags.iter().any(|f| f == "dense");
        let sorted = col.flags.iter().any(|f| f == "sorted");
        let set_id = col.flags.iter().any(|f| f == "set_id");
        let hidden = col.flags.iter().any(|f| f == "hidden");

        let field_ty = if non_null {
            quote! { #value_ty }
        } else {
            quote! { ::std::option::Option<#value_ty> }
        };
        row_fields.push(quote! { pub #field_name: #field_ty });

        let mut flag_terms = Vec::new();
        if sorted {
            flag_terms.push(quote! { ::tracedb_core::value::ColumnFlags::SORTED });
        }
        if non_null {
            flag_terms.push(quote! { ::tracedb_core::value::ColumnFlags::NON_NULL });
        }
        if dense {
            flag_terms.push(quote! { ::tracedb_core::value::ColumnFlags::DENSE });
        }
        if hidden {
            flag_terms.push(quote! { ::tracedb_core::value::ColumnFlags::HIDDEN });
        }
        if set_id {
            flag_terms.push(quote! { ::tracedb_core::value::ColumnFlags::SET_ID });
        }
        let flags_expr = if flag_terms.is_empty() {
            quote! { ::tracedb_core::value::ColumnFlags::empty() }
        } else {
            quote! { #(#flag_terms)|* }
        };

        let storage_expr = storage_ctor(&col.ty, dense, non_null);
        let col_type_expr = column_type_variant(&col.ty);
        let col_name_str = col.name.to_string();
        push_column_calls.push(quote! {
            table.push_column(
                #col_name_str,
                #col_type_expr,
                #flags_expr,
                ::std::sync::Arc::new(#storage_expr),
                overlay,
            );
        });
        let _ = col_index;

        let value_expr = if non_null {
            quote! { ::std::option::Option::Some(row.#field_name) }
        } else {
            quote! { row.#field_name }
        };
        insert_calls.push(quote! {
            ::tracedb_core::typed_column::TypedColumnMut::<#value_ty>::new(self.table.storage_mut(#columns_mod::#const_name))
                .expect("column type matches declaration")
                .append(#value_expr);
        });

        index_consts.push(quote! { pub const #const_name: u32 = #col_index; });

        let ct = column_type_variant(&col.ty);
        schema_columns.push(quote! {
            ::tracedb_core::value::SchemaColumn {
                name: #col_name_str.to_string(),
                sql_type: #ct,
                is_id: false,
                is_sorted: #sorted,
                is_hidden: #hidden,
                is_set_id: #set_id,
            }
        });
    }

    let expanded = quote! {
        pub mod #columns_mod {
            #(#index_consts)*
        }

        #[derive(Debug, Clone, Default)]
        pub struct #row_ident {
            #(#row_fields),*
        }

        pub struct #table_ident {
            table: ::tracedb_core::table::Table,
        }

        impl #table_ident {
            pub fn new(pool: ::std::rc::Rc<::std::cell::RefCell<::tracedb_core::string_pool::StringPool>>) -> Self {
                let mut table = ::tracedb_core::table::Table::new(pool);
                let overlay = 0u32;
                table.push_column(
                    "id",
                    ::tracedb_core::value::ColumnType::Id,
                    ::tracedb_core::value::ColumnFlags::NON_NULL,
                    ::std::sync::Arc::new(::tracedb_core::storage::Storage::Id),
                    overlay,
                );
                #(#push_column_calls)*
                #table_ident { table }
            }

            pub fn table(&self) -> &::tracedb_core::table::Table {
                &self.table
            }

            pub fn into_table(self) -> ::tracedb_core::table::Table {
                self.table
            }

            pub fn static_schema() -> ::tracedb_core::value::Schema {
                ::tracedb_core::value::Schema::new(vec![
                    ::tracedb_core::value::SchemaColumn {
                        name: "id".to_string(),
                        sql_type: ::tracedb_core::value::ColumnType::Id,
                        is_id: true,
                        is_sorted: false,
                        is_hidden: false,
                        is_set_id: false,
                    },
                    #(#schema_columns),*
                ])
            }

            pub fn insert(&mut self, row: #row_ident) -> u32 {
                let idx = self.table.begin_insert(None);
                #(#insert_calls)*
                idx
            }

            pub fn extend_parent(parent: &::tracedb_core::table::Table) -> ::tracedb_core::table::Table {
                ::tracedb_core::table::Table::extend_parent(parent)
            }

            pub fn select_and_extend_parent(
                parent: &::tracedb_core::table::Table,
                row_numbers: &::tracedb_core::row_map::RowMap,
            ) -> ::tracedb_core::table::Table {
                ::tracedb_core::table::Table::select_and_extend_parent(parent, row_numbers)
            }
        }
    };

    TokenStream::from(expanded)
}

fn to_snake_case(s: &str) -> String {
    let mut out = String::new();
    for (i, c) in s.char_indices() {
        if c.is_uppercase() && i != 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

//! Procedural macros for weathermap

use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use proc_macro2::Ident;
use quote::{format_ident, quote};
use std::collections::BTreeMap;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Action)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(action), supports(enum_any))]
struct ActionOpts {
    ident: syn::Ident,
    data: darling::ast::Data<ActionVariant, ()>,

    /// Enable automatic category inference from variant name prefixes
    #[darling(default)]
    infer_categories: bool,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(action))]
struct ActionVariant {
    ident: syn::Ident,
    fields: darling::ast::Fields<()>,

    /// Explicit category override
    #[darling(default)]
    category: Option<String>,

    /// Exclude from category inference
    #[darling(default)]
    skip_category: bool,
}

// Verbs that END an action name. The parts before the verb name the subject,
// which becomes the category ("OverlayChange" -> "overlay").
const ACTION_VERBS: &[&str] = &[
    // Lifecycle
    "Load", "Retry", "Init", "Fail", "Mount", "Unmount", // Map interaction
    "Move", "Change", "Submit", "Resolve", "Dismiss", // Url sync
    "Write", "Due", "Replace",
];

/// Marker for async results: `WidgetDidInit` belongs to `widget`.
const RESULT_MARKER: &str = "Did";

/// Split a PascalCase string into parts
fn split_pascal_case(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for ch in s.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            parts.push(current);
            current = String::new();
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Convert PascalCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// Convert snake_case to PascalCase
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

/// Infer category from a variant name.
///
/// The subject ends at the first `Did` marker or action verb after the first
/// part: `SearchSubmit` and `SearchDidResolve` both map to `search`,
/// `UrlWriteDue` maps to `url`. Names starting with a verb (`Retry`) or
/// without any verb stay uncategorized.
fn infer_category(name: &str) -> Option<String> {
    let parts = split_pascal_case(name);
    if parts.len() < 2 {
        return None;
    }

    if parts[0] == RESULT_MARKER || ACTION_VERBS.contains(&parts[0].as_str()) {
        return None;
    }

    let prefix_end = parts
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, part)| part.as_str() == RESULT_MARKER || ACTION_VERBS.contains(&part.as_str()))
        .map(|(i, _)| i)?;

    Some(to_snake_case(&parts[..prefix_end].concat()))
}

/// Derive macro for the Action trait
///
/// Generates a `name()` method that returns the variant name as a static string.
///
/// With `#[action(infer_categories)]`, also generates:
/// - `category() -> Option<&'static str>`
/// - `category_enum() -> {Name}Category`
/// - `is_{category}()` predicates for each category
/// - `{Name}Category` enum with all discovered categories
///
/// # Example
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// #[action(infer_categories)]
/// enum MapAction {
///     SearchSubmit(String),
///     SearchDidResolve { sequence: u64 },
///     OverlayChange(OverlayKind),
/// }
///
/// let action = MapAction::SearchSubmit("Paris".into());
/// assert_eq!(action.name(), "SearchSubmit");
/// assert_eq!(action.category(), Some("search"));
/// assert!(action.is_search());
/// ```
#[proc_macro_derive(Action, attributes(action))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match ActionOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;

    let variants = match &opts.data {
        darling::ast::Data::Enum(variants) => variants,
        _ => {
            return syn::Error::new_spanned(&input, "Action can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    let name_arms = variants.iter().map(|v| {
        let variant_name = &v.ident;
        let variant_str = variant_name.to_string();

        match &v.fields.style {
            darling::ast::Style::Unit => quote! {
                #name::#variant_name => #variant_str
            },
            darling::ast::Style::Tuple => quote! {
                #name::#variant_name(..) => #variant_str
            },
            darling::ast::Style::Struct => quote! {
                #name::#variant_name { .. } => #variant_str
            },
        }
    });

    let mut expanded = quote! {
        impl weathermap::Action for #name {
            fn name(&self) -> &'static str {
                match self {
                    #(#name_arms),*
                }
            }
        }
    };

    if !opts.infer_categories {
        return TokenStream::from(expanded);
    }

    // BTreeMap keeps the generated category enum in a stable order
    let mut categories: BTreeMap<String, Vec<&Ident>> = BTreeMap::new();
    let mut variant_categories: Vec<(&Ident, Option<String>)> = Vec::new();

    for v in variants.iter() {
        let cat = if v.skip_category {
            None
        } else if let Some(ref explicit_cat) = v.category {
            Some(explicit_cat.clone())
        } else {
            infer_category(&v.ident.to_string())
        };

        if let Some(ref category) = cat {
            categories.entry(category.clone()).or_default().push(&v.ident);
        }
        variant_categories.push((&v.ident, cat));
    }

    let category_arms: Vec<_> = variant_categories
        .iter()
        .map(|(variant, cat)| {
            let cat_expr = match cat {
                Some(c) => quote! { ::core::option::Option::Some(#c) },
                None => quote! { ::core::option::Option::None },
            };
            quote! { #name::#variant { .. } => #cat_expr }
        })
        .collect();

    let category_enum_name = format_ident!("{}Category", name);
    let category_variants: Vec<_> = categories
        .keys()
        .map(|c| format_ident!("{}", to_pascal_case(c)))
        .collect();
    let category_variant_names: Vec<_> = categories.keys().cloned().collect();

    let category_enum_arms: Vec<_> = variant_categories
        .iter()
        .map(|(variant, cat)| {
            let cat_variant = match cat {
                Some(c) => format_ident!("{}", to_pascal_case(c)),
                None => format_ident!("Uncategorized"),
            };
            quote! { #name::#variant { .. } => #category_enum_name::#cat_variant }
        })
        .collect();

    let predicates: Vec<_> = categories
        .iter()
        .map(|(cat, cat_variants)| {
            let predicate_name = format_ident!("is_{}", cat);
            let patterns: Vec<_> = cat_variants
                .iter()
                .map(|v| quote! { #name::#v { .. } })
                .collect();
            let doc = format!(
                "Returns true if this action belongs to the `{}` category.",
                cat
            );

            quote! {
                #[doc = #doc]
                pub fn #predicate_name(&self) -> bool {
                    matches!(self, #(#patterns)|*)
                }
            }
        })
        .collect();

    let category_enum_doc = format!(
        "Action categories for [`{}`].\n\n\
         Use [`{}::category_enum()`] to get the category of an action.",
        name, name
    );

    expanded = quote! {
        #expanded

        #[doc = #category_enum_doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum #category_enum_name {
            #(#category_variants,)*
            /// Actions that don't belong to any specific category.
            Uncategorized,
        }

        impl #category_enum_name {
            /// Get all category values
            pub fn all() -> &'static [Self] {
                &[#(Self::#category_variants,)* Self::Uncategorized]
            }

            /// Get category name as string
            pub fn name(&self) -> &'static str {
                match self {
                    #(Self::#category_variants => #category_variant_names,)*
                    Self::Uncategorized => "uncategorized",
                }
            }
        }

        impl #name {
            /// Get the action's category (if categorized)
            pub fn category(&self) -> ::core::option::Option<&'static str> {
                match self {
                    #(#category_arms,)*
                }
            }

            /// Get the category as an enum value
            pub fn category_enum(&self) -> #category_enum_name {
                match self {
                    #(#category_enum_arms,)*
                }
            }

            #(#predicates)*
        }

        impl weathermap::ActionCategory for #name {
            type Category = #category_enum_name;

            fn category(&self) -> ::core::option::Option<&'static str> {
                #name::category(self)
            }

            fn category_enum(&self) -> Self::Category {
                #name::category_enum(self)
            }
        }
    };

    TokenStream::from(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_category_intent_and_result_share_subject() {
        assert_eq!(infer_category("SearchSubmit").as_deref(), Some("search"));
        assert_eq!(infer_category("SearchDidResolve").as_deref(), Some("search"));
        assert_eq!(infer_category("WidgetDidInit").as_deref(), Some("widget"));
        assert_eq!(infer_category("WidgetLoad").as_deref(), Some("widget"));
    }

    #[test]
    fn test_infer_category_multi_part_subject() {
        assert_eq!(infer_category("UrlWriteDue").as_deref(), Some("url"));
        assert_eq!(infer_category("StaticOverlayDidLoad").as_deref(), Some("static_overlay"));
    }

    #[test]
    fn test_infer_category_uncategorized() {
        assert_eq!(infer_category("Tick"), None);
        assert_eq!(infer_category("RetryWidget"), None);
        assert_eq!(infer_category("DidSomething"), None);
        assert_eq!(infer_category("MapSomething"), None);
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(to_snake_case("StaticOverlay"), "static_overlay");
        assert_eq!(to_pascal_case("static_overlay"), "StaticOverlay");
        assert_eq!(split_pascal_case("UrlDidChange"), vec!["Url", "Did", "Change"]);
    }
}

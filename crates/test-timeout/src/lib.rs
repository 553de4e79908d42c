//! Test attributes that fail a test instead of letting it hang.
//!
//! `#[timeout]` wraps a synchronous test, `#[tokio_timeout_test]` an async
//! one. Both accept an optional limit in seconds; the async variant also
//! accepts `paused`, which starts the runtime with a paused clock so timer
//! driven code advances instantly (consumers need tokio's `test-util`).

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, Ident, ItemFn, LitInt, Token, parse_macro_input};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

enum Setting {
    Seconds(LitInt),
    Paused(Ident),
}

impl Parse for Setting {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitInt) {
            return input.parse().map(Setting::Seconds);
        }
        let ident: Ident = input.parse()?;
        if ident == "paused" {
            Ok(Setting::Paused(ident))
        } else {
            Err(syn::Error::new_spanned(
                ident,
                "expected a timeout in seconds or `paused`",
            ))
        }
    }
}

struct Options {
    timeout_secs: u64,
    paused: Option<Ident>,
}

impl Parse for Options {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut options = Options {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            paused: None,
        };
        for setting in Punctuated::<Setting, Token![,]>::parse_terminated(input)? {
            match setting {
                Setting::Seconds(lit) => {
                    let secs: u64 = lit.base10_parse()?;
                    if secs == 0 {
                        return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
                    }
                    options.timeout_secs = secs;
                }
                Setting::Paused(ident) => options.paused = Some(ident),
            }
        }
        Ok(options)
    }
}

/// Runs the reporting thread and converts a missing result into a failure.
fn guarded(timeout_secs: u64, body: TokenStream2) -> TokenStream2 {
    quote! {
        let timeout_duration = std::time::Duration::from_secs(#timeout_secs);
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| { #body }));
            let _ = sender.send(result);
        });
        match receiver.recv_timeout(timeout_duration) {
            Ok(Ok(_)) => {}
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => panic!("test timed out"),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                panic!("test thread failed before reporting result")
            }
        }
    }
}

fn path_is(attr: &Attribute, expected: &[&str]) -> bool {
    let segments: Vec<_> = attr.path().segments.iter().collect();
    segments.len() == expected.len()
        && segments
            .iter()
            .zip(expected)
            .all(|(segment, name)| segment.ident == name)
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as Options);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.take().is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }

    let attrs = attrs.into_iter().filter(|attr| !path_is(attr, &["tokio", "test"]));
    let clock = options.paused.map(|_| quote! { .start_paused(true) });
    let timeout_secs = options.timeout_secs;
    let body = guarded(
        timeout_secs,
        quote! {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                #clock
                .build()
                .expect("failed to build Tokio runtime");
            runtime.block_on(async {
                tokio::time::timeout(std::time::Duration::from_secs(#timeout_secs), async move #block)
                    .await
                    .expect("test timed out");
            });
        },
    );

    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #body
        }
    }
    .into()
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as Options);
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout attribute expects a synchronous test function",
        )
        .to_compile_error()
        .into();
    }
    if let Some(paused) = options.paused {
        return syn::Error::new_spanned(paused, "`paused` only applies to tokio_timeout_test")
            .to_compile_error()
            .into();
    }

    let attrs = attrs.into_iter().filter(|attr| !path_is(attr, &["test"]));
    let body = guarded(options.timeout_secs, quote! { #block });

    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #body
        }
    }
    .into()
}

//! Generates Swift and Kotlin bindings for `sealkit-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}

// Copyright 2025-2026 CEMAXECUTER LLC

fn main() {
    #[cfg(feature = "sdrplay-api")]
    {
        println!("cargo:rustc-link-lib=sdrplay_api");
    }
}

// Copyright 2025-2026 CEMAXECUTER LLC

fn main() {
    // SDRplay API installer: embed rpath so the binary finds libsdrplay_api.so
    // at runtime without LD_LIBRARY_PATH.
    #[cfg(feature = "sdrplay-api")]
    {
        let sdrplay_lib_dir = "/usr/local/lib";
        if std::path::Path::new(sdrplay_lib_dir).is_dir() {
            println!("cargo:rustc-link-arg=-Wl,-rpath,{}", sdrplay_lib_dir);
        }
    }
}

fn main() {
    if !cfg!(target_os = "linux") {
        panic!(
            "{} only works on linux (ptrace debugger backend)",
            env!("CARGO_PKG_NAME")
        );
    }
}

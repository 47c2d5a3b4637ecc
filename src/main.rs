fn main() -> std::process::ExitCode {
    hydrate_reminder::run()
}

fn main() {
    std::process::exit(pomotrack::run());
}

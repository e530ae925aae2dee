fn main() {
    stahld_cmd::run();
}

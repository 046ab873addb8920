fn main() {
    seller_console_lib::run()
}

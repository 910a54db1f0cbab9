fn main() -> anyhow::Result<()> {
    lookaway_lib::run()
}

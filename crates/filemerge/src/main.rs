use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = filemerge::ui::app::CliApp::parse();
    filemerge::init_with_verbosity(cli.verbose);
    cli.run()
}

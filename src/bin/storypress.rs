use color_eyre::Result;

fn main() -> Result<()> {
    storypress::storypress::run()
}

use toolbox_test_support::ToolboxFixture;

#[tokio::main]
async fn main() {
    let fixture = ToolboxFixture::new().await;
    eprintln!("Toolbox fixture server running at {}", fixture.url);
    let _ = tokio::signal::ctrl_c().await;
}

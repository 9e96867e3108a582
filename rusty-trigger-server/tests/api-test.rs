//! Tests which start the binary and call the api.

use std::path::PathBuf;
use std::time::Duration;

use httpc_test::Client;
use tokio::process::Child;

const ROUTES: &str = "/testBasic,echo 'hi'
/testError,somethingthatdoesntexist
/testReplace,\"echo -n '$parm1'\"
/testCat,cat
";

/// Writes the test route table to a fresh temporary file.
fn routes_file() -> anyhow::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("rusty-trigger-routes-{}.csv", fastrand::u64(..)));
    std::fs::write(&path, ROUTES)?;
    Ok(path)
}

/// Starts the rusty trigger binary and returns a child to abort it and a client to interact with it.
async fn spawn_server(args: &[&str]) -> anyhow::Result<(Child, Client)> {
    // IANA recommended port range.
    let port = fastrand::u16(49152..65535);
    let child = tokio::process::Command::new(env!("CARGO_BIN_EXE_rusty-trigger-server"))
        .kill_on_drop(true)
        .args(["--host", "127.0.0.1"])
        .args(["--port", &port.to_string()])
        .args(args)
        .spawn()
        .expect("Couldn't spawn server");
    let hc = httpc_test::new_client(format!("http://127.0.0.1:{port}"))?;

    for _ in 0..50 {
        if hc.do_get("/metrics").await.is_ok() {
            return Ok((child, hc));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("server did not start listening")
}

#[tokio::test(flavor = "current_thread")]
async fn metrics() -> anyhow::Result<()> {
    let (mut child, hc) = spawn_server(&["--cmd", "echo 'hi'"]).await?;

    let response = hc.do_get("/metrics").await?;
    response.print().await?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text_body()?, "# TYPE isupdummy counter\nisupdummy 1\n");

    child.kill().await.expect("Couldn't kill server");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn static_command() -> anyhow::Result<()> {
    let (mut child, hc) = spawn_server(&["--cmd", "echo 'hi'"]).await?;

    let response = hc.do_get("/do").await?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text_body()?, "OK");

    let response = hc.do_get("/other").await?;
    assert_eq!(response.status().as_u16(), 404);

    child.kill().await.expect("Couldn't kill server");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn route_file_verbose() -> anyhow::Result<()> {
    let routes = routes_file()?;
    let (mut child, hc) = spawn_server(&[
        "--routes",
        routes.to_str().expect("temp dir is utf8"),
        "--return-result",
        "--replace-param",
    ])
    .await?;

    let response = hc.do_get("/testBasic").await?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text_body()?, "hi\n");

    let response = hc.do_get("/testError").await?;
    assert_eq!(response.status().as_u16(), 500);
    assert!(response.text_body()?.contains("command not found"));

    let response = hc.do_get("/testReplace?$parm1=Value").await?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text_body()?, "Value");

    let response = hc.do_get("/testReplace?$parm1=a%3Bb").await?;
    assert_eq!(response.status().as_u16(), 500);

    let response = hc.do_post("/testReplace", "ignored").await?;
    assert_eq!(response.status().as_u16(), 200);

    child.kill().await.expect("Couldn't kill server");
    let _ = std::fs::remove_file(routes);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn piped_body() -> anyhow::Result<()> {
    let routes = routes_file()?;
    let (mut child, hc) = spawn_server(&[
        "--routes",
        routes.to_str().expect("temp dir is utf8"),
        "--return-result",
        "--pipe-body",
    ])
    .await?;

    let response = hc.do_post("/testCat", "echo 'HIIII'").await?;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text_body()?, "echo 'HIIII'");

    child.kill().await.expect("Couldn't kill server");
    let _ = std::fs::remove_file(routes);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn foreign_address_is_denied() -> anyhow::Result<()> {
    let (mut child, hc) = spawn_server(&["--cmd", "echo 'hi'", "--allowed-ips", "10.9.9.9"]).await?;

    let response = hc.do_get("/do").await?;
    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(response.text_body()?, "NOACCESS");

    child.kill().await.expect("Couldn't kill server");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn rate_limit() -> anyhow::Result<()> {
    let (mut child, hc) = spawn_server(&["--cmd", "true", "--max-rate-limit", "2"]).await?;

    for _ in 0..2 {
        assert_eq!(hc.do_get("/do").await?.status().as_u16(), 200);
    }
    let response = hc.do_get("/do").await?;
    assert_eq!(response.status().as_u16(), 429);
    // No body at all, so not even an empty text body.
    assert_eq!(response.header("content-length").as_deref(), Some("0"));
    assert!(response.text_body().is_err());

    child.kill().await.expect("Couldn't kill server");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn unsupported_method() -> anyhow::Result<()> {
    let (mut child, hc) = spawn_server(&["--cmd", "true"]).await?;

    let response = hc.do_delete("/do").await?;
    assert_eq!(response.status().as_u16(), 405);

    child.kill().await.expect("Couldn't kill server");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn startup_failures_exit_non_zero() -> anyhow::Result<()> {
    let bin = env!("CARGO_BIN_EXE_rusty-trigger-server");

    // Neither --cmd nor --routes.
    let status = tokio::process::Command::new(bin)
        .args(["--port", "1"])
        .status()
        .await?;
    assert!(!status.success());

    let status = tokio::process::Command::new(bin)
        .args(["--cmd", "true", "--replace-regex", "[a-"])
        .status()
        .await?;
    assert!(!status.success());

    let status = tokio::process::Command::new(bin)
        .args(["--routes", "/nonexistent/routes.csv"])
        .status()
        .await?;
    assert!(!status.success());

    // Usage error from clap.
    let status = tokio::process::Command::new(bin)
        .args(["--port", "0"])
        .status()
        .await?;
    assert_eq!(status.code(), Some(2));
    Ok(())
}

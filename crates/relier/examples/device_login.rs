//! Native-app login against a live provider using a loopback redirect.
//!
//! Flow:
//! 1. Discover the issuer and register this client dynamically
//! 2. Print the authorization URL for the user's browser
//! 3. Capture the redirect on 127.0.0.1 and finish the code exchange
//! 4. Peek at the ID-token claims, refresh once, then log out
//!
//! The provider must allow open dynamic client registration and loopback
//! redirect URIs. Run with:
//!
//! `cargo run --example device_login -- https://your-issuer.example.com`

use std::collections::HashMap;
use std::sync::Arc;

use relier::{
    ClientConfig, MemorySecretStore, OidcClient, RedirectOutcome, RedirectRequest,
    ResponseHandle, SessionState, UserAgent, peek_id_token_claims,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Presents each redirect by printing its URL, then captures the terminal
/// response on the loopback address the redirect URIs point at.
#[derive(Debug)]
struct LoopbackAgent;

impl UserAgent for LoopbackAgent {
    fn present(&self, request: RedirectRequest, handle: ResponseHandle) {
        println!("\nOpen this URL in your browser:\n\n  {}\n", request.url);
        tokio::spawn(async move {
            match capture_redirect(&request.callback).await {
                Ok(params) => handle.resolve(RedirectOutcome::Completed(params)),
                Err(err) => handle.resolve(RedirectOutcome::Failed(err.to_string())),
            }
        });
    }
}

/// Accept one connection on the callback's address and parse the query
/// parameters out of the request line.
async fn capture_redirect(
    callback: &Url,
) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
    let host = callback.host_str().unwrap_or("127.0.0.1");
    let port = callback.port().unwrap_or(80);
    let listener = TcpListener::bind((host, port)).await?;

    let (mut stream, _) = listener.accept().await?;
    let mut buf = vec![0u8; 4096];
    let read = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..read]);

    let target = request
        .split_whitespace()
        .nth(1)
        .ok_or("malformed HTTP request")?;
    let full = callback.join(target)?;
    let params: HashMap<String, String> = full
        .query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    stream
        .write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\r\n\
              You can close this tab and return to the terminal.\n",
        )
        .await?;
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(issuer) = std::env::args().nth(1) else {
        eprintln!("usage: device_login <issuer-url>");
        std::process::exit(2);
    };

    let config = ClientConfig::new(
        &issuer,
        "http://127.0.0.1:8977/signin",
        "http://127.0.0.1:8977/signout",
        "openid profile offline_access",
    )?;
    let state = SessionState::new(Arc::new(MemorySecretStore::new()));
    let client = OidcClient::new(config, state, Arc::new(LoopbackAgent))?;

    println!("=== Login ===");
    let Some(tokens) = client.login().await? else {
        println!("login cancelled");
        return Ok(());
    };
    let preview: String = tokens.access_token.chars().take(16).collect();
    println!("access token: {preview}...");
    if let Some(claims) = client.state().id_token().as_deref().and_then(peek_id_token_claims) {
        println!("subject: {}", claims.sub);
    }

    if tokens.refresh_token.is_some() {
        println!("\n=== Refresh ===");
        match client.refresh().await? {
            Some(fresh) => println!("new access token expires {:?}", fresh.expires_at),
            None => println!("refresh token already expired; log in again"),
        }
    }

    println!("\n=== Logout ===");
    client.logout().await?;
    println!("logged out");
    Ok(())
}

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::prompt::Prompter;

/// Challenge rounds (two-factor or captcha) accepted before giving up.
const MAX_CHALLENGES: usize = 5;

#[derive(Debug, Clone)]
pub struct Session {
    /// Unknown when the token came straight from configuration.
    pub user_id: Option<i64>,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user_id: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
    captcha_sid: Option<String>,
    captcha_img: Option<String>,
}

/// Obtains a session: a configured token is used as is, otherwise the direct
/// login handshake runs, asking the operator for anything it is missing.
pub async fn authenticate<P: Prompter + ?Sized>(
    client: &reqwest::Client,
    config: &Config,
    prompter: &mut P,
) -> Result<Session> {
    if let Some(token) = &config.access_token {
        info!("using configured access token");
        return Ok(Session {
            user_id: None,
            access_token: token.clone(),
        });
    }

    let app_id = config
        .app_id
        .ok_or_else(|| ArchiveError::Config("app_id is required to log in".to_string()))?;
    let login = match &config.login {
        Some(login) => login.clone(),
        None => prompter.ask_line("Enter login or phone number")?,
    };
    let password = match &config.password {
        Some(password) => password.clone(),
        None => prompter.ask_secret("Enter password")?,
    };

    let mut params: Vec<(&str, String)> = vec![
        ("grant_type", "password".to_string()),
        ("client_id", app_id.to_string()),
        ("username", login),
        ("password", password),
        ("2fa_supported", "1".to_string()),
        ("v", config.api_version.clone()),
    ];
    if let Some(secret) = &config.client_secret {
        params.push(("client_secret", secret.clone()));
    }

    let mut challenge: Vec<(&str, String)> = Vec::new();
    for _ in 0..=MAX_CHALLENGES {
        let mut query = params.clone();
        query.extend(challenge.iter().cloned());

        let resp: TokenResponse = client
            .get(&config.oauth_url)
            .query(&query)
            .send()
            .await?
            .json()
            .await?;

        if let Some(access_token) = resp.access_token {
            return Ok(Session {
                user_id: resp.user_id,
                access_token,
            });
        }

        match resp.error.as_deref() {
            Some("need_validation") => {
                debug!("two-factor code requested");
                let code = prompter.ask_line("Enter authentication code")?;
                challenge = vec![("code", code.trim().to_string())];
            }
            Some("need_captcha") => {
                let sid = resp
                    .captcha_sid
                    .ok_or_else(|| ArchiveError::Auth("captcha requested without captcha_sid".into()))?;
                let img = resp.captcha_img.unwrap_or_default();
                let key = prompter.ask_line(&format!("Enter captcha code {img}"))?;
                challenge = vec![("captcha_sid", sid), ("captcha_key", key.trim().to_string())];
            }
            Some(other) => {
                return Err(ArchiveError::Auth(
                    resp.error_description.unwrap_or_else(|| other.to_string()),
                ));
            }
            None => return Err(ArchiveError::Auth("no access token in response".into())),
        }
    }

    Err(ArchiveError::Auth(format!(
        "gave up after {MAX_CHALLENGES} challenge rounds"
    )))
}

use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub receivers_path: PathBuf,
    pub senders_path: PathBuf,
    pub max_upload_size: usize,
    pub smtp: SmtpConfig,
    pub gateway: Option<GatewayConfig>,
    pub sheets: SheetsConfig,
}

/// Mail submission endpoint. Always STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
        }
    }
}

/// WhatsApp gateway (Evolution API) connection settings.
#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub instance_name: String,
    pub api_key: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("instance_name", &self.instance_name)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct SheetsConfig {
    pub sheet_id: Option<String>,
    pub service_account_file: PathBuf,
    pub service_account_json: Option<String>,
    pub worksheet: Option<String>,
    pub api_base: String,
}

impl std::fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("sheet_id", &self.sheet_id)
            .field("service_account_file", &self.service_account_file)
            .field(
                "service_account_json",
                &self.service_account_json.as_ref().map(|_| "[REDACTED]"),
            )
            .field("worksheet", &self.worksheet)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            sheet_id: None,
            service_account_file: PathBuf::from("service_account.json"),
            service_account_json: None,
            worksheet: None,
            api_base: "https://sheets.googleapis.com/v4".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host: IpAddr = env_or("BULKCAST_HOST", "127.0.0.1")
            .parse()
            .map_err(|e| format!("Invalid BULKCAST_HOST: {e}"))?;

        let port: u16 = env_or("BULKCAST_PORT", "8501")
            .parse()
            .map_err(|e| format!("Invalid BULKCAST_PORT: {e}"))?;

        let log_level = env_or("BULKCAST_LOG_LEVEL", "info");

        let data_dir = PathBuf::from(env_or("BULKCAST_DATA_DIR", "data"));
        let receivers_path = std::env::var("BULKCAST_RECEIVERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("emails.csv"));
        let senders_path = std::env::var("BULKCAST_SENDERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("senders-emails.csv"));

        let max_upload_size: usize = env_or("BULKCAST_MAX_UPLOAD_SIZE", "26214400")
            .parse()
            .map_err(|e| format!("Invalid BULKCAST_MAX_UPLOAD_SIZE: {e}"))?;

        let smtp = SmtpConfig {
            host: env_or("BULKCAST_SMTP_HOST", "smtp.gmail.com"),
            port: env_or("BULKCAST_SMTP_PORT", "587")
                .parse()
                .map_err(|e| format!("Invalid BULKCAST_SMTP_PORT: {e}"))?,
        };

        let gateway = match (
            env_non_empty("EVO_BASE_URL"),
            env_non_empty("EVO_INSTANCE_NAME"),
            env_non_empty("AUTHENTICATION_API_KEY"),
        ) {
            (Some(base_url), Some(instance_name), Some(api_key)) => Some(GatewayConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                instance_name,
                api_key,
            }),
            (None, None, None) => None,
            _ => {
                return Err(
                    "Incomplete WhatsApp gateway settings: set all of EVO_BASE_URL, EVO_INSTANCE_NAME and AUTHENTICATION_API_KEY, or none".to_string(),
                );
            }
        };

        let sheets = SheetsConfig {
            sheet_id: env_non_empty("GOOGLE_SHEET_ID"),
            service_account_file: PathBuf::from(env_or(
                "BULKCAST_SERVICE_ACCOUNT_FILE",
                "service_account.json",
            )),
            service_account_json: env_non_empty("SERVICE_ACCOUNT_JSON"),
            worksheet: env_non_empty("BULKCAST_SHEET_NAME"),
            api_base: env_or("BULKCAST_SHEETS_API_BASE", "https://sheets.googleapis.com/v4")
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Config {
            host,
            port,
            log_level,
            receivers_path,
            senders_path,
            max_upload_size,
            smtp,
            gateway,
            sheets,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

mod settings;

pub use settings::{
    DatabaseConfig, EnvelopeDefaults, MailDefaults, MailPlatformConfig, OtelConfig,
    PlatformConfig, PushPlatformConfig, RedisConfig, ServerConfig, Settings, SmtpConfig, SmtpTls,
    TemplatesConfig, WorkerConfig,
};

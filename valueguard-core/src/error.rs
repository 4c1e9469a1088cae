use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("document encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("该邮箱已被注册")]
    EmailTaken,
    #[error("该手机号已被注册")]
    PhoneTaken,
    #[error("用户不存在")]
    UserNotFound,
    #[error("账号或密码错误")]
    InvalidCredentials,
    #[error("无效的手机号：{0}")]
    InvalidPhoneNumber(String),
    #[error("人机验证未通过")]
    CaptchaRejected,
    #[error("验证码已失效，请重新获取")]
    CodeExpired,
    #[error("验证码错误")]
    CodeMismatch,
    #[error("验证码错误次数过多，请重新获取")]
    TooManyAttempts,
    #[error("登录凭证无效")]
    InvalidToken,
    #[error("登录凭证已过期")]
    TokenExpired,
    #[error("短信发送失败：{0}")]
    Sms(String),
    #[error("password hashing: {0}")]
    PasswordHash(String),
    #[error("account storage: {0}")]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for IdentityError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}

#[derive(Debug, Error)]
pub enum CategorizeError {
    #[error("unsupported llm provider '{0}'")]
    UnsupportedProvider(String),
    #[error("missing env var {0}")]
    MissingApiKey(String),
    #[error("openai client error: {0}")]
    Client(String),
    #[error("llm prompt failed: {0}")]
    Prompt(String),
    #[error("invalid categorization reply: {0}")]
    InvalidReply(#[from] serde_json::Error),
    #[error("No categories returned from prompt.")]
    MissingCategories,
}

/// Failures inside a server action, before they are rendered as a message.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{}", form_schema::messages::USER_NOT_FOUND)]
    UserNotFound,
    #[error("{}", form_schema::messages::PHONE_VERIFICATION_FAILED)]
    PhoneNotVerified,
    #[error("{}", form_schema::messages::INCIDENT_NOT_FOUND)]
    IncidentNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

//! User-facing strings (zh-CN).

pub const REPORT_INVALID: &str = "错误：请修正字段后重试。";
pub const REPORT_SUBMITTED: &str = "事件提交成功！";
pub const REPORT_FAILED: &str = "事件提交失败，请稍后重试。";

pub const REVIEW_SUBMITTED: &str = "已提交审核！";
pub const INCIDENT_NOT_FOUND: &str = "事件不存在";

pub const SIGN_UP_INVALID: &str = "字段无效";
pub const SIGN_UP_SUCCEEDED: &str = "注册成功，请登录。";
pub const SIGN_UP_FAILED_PREFIX: &str = "注册失败";
pub const PHONE_VERIFICATION_FAILED: &str = "手机号验证失败，请重新验证。";

pub const COMMENT_INVALID: &str = "评论无效";
pub const COMMENT_POSTED: &str = "评论已发布";
pub const COMMENT_FAILED_PREFIX: &str = "发表评论失败";

pub const USER_NOT_FOUND: &str = "未找到用户";

pub const ACCOUNT_REQUIRED: &str = "请输入邮箱或手机号。";
pub const ACCOUNT_INVALID: &str = "请输入有效的邮箱或手机号。";
pub const PHONE_ACCOUNT_NOT_FOUND: &str = "未找到该手机号对应的账号。";
pub const ACCOUNT_MISSING_EMAIL: &str = "该账号缺少登录邮箱，请联系管理员。";
pub const ACCOUNT_LOOKUP_FAILED_PREFIX: &str = "账号查询失败";

pub const COMPANY_NAME_TOO_SHORT: &str = "公司名称至少需要 2 个字符。";
pub const TITLE_TOO_SHORT: &str = "标题至少需要 10 个字符。";
pub const DESCRIPTION_TOO_SHORT: &str = "内容至少需要 50 个字符。";
pub const CATEGORIES_REQUIRED: &str = "请至少选择一个分类。";
pub const REVIEW_TOO_SHORT: &str = "内容至少需要 20 个字符。";
pub const COMMENT_REQUIRED: &str = "评论不能为空。";
pub const PASSWORD_TOO_SHORT: &str = "密码至少需要 6 个字符。";
pub const EMAIL_INVALID: &str = "请输入有效的邮箱地址。";
pub const DISPLAY_NAME_TOO_SHORT: &str = "昵称至少需要 2 个字符。";
pub const PHONE_REQUIRED: &str = "请输入手机号。";
pub const PHONE_INVALID: &str = "请输入正确的手机号（含国家区号）。";
pub const SMS_CODE_REQUIRED: &str = "请输入短信验证码。";
pub const SMS_NOT_VERIFIED: &str = "请先完成短信验证。";
pub const AGREE_REQUIRED: &str = "请同意隐私政策。";
pub const FIELD_REQUIRED: &str = "此字段为必填项。";

pub const SIGN_IN_REQUIRED: &str = "请先登录。";
pub const SIGN_IN_REQUIRED_FOR_REPORT: &str = "请先登录后再提交事件。";
pub const SIGN_IN_REQUIRED_FOR_COMMENT: &str = "请先登录后参与讨论。";
pub const CODE_NOT_REQUESTED: &str = "请先获取验证码。";
pub const CAPTCHA_UNAVAILABLE: &str = "验证码初始化失败，请刷新重试。";

pub fn sign_up_failed(cause: &str) -> String {
    format!("{SIGN_UP_FAILED_PREFIX}：{cause}")
}

pub fn comment_failed(cause: &str) -> String {
    format!("{COMMENT_FAILED_PREFIX}：{cause}")
}

pub fn account_lookup_failed(cause: &str) -> String {
    format!("{ACCOUNT_LOOKUP_FAILED_PREFIX}：{cause}")
}

//! Request payloads and input validation
//!
//! Validation is first-violation-wins in a fixed field order (phone,
//! password, name, email) so clients get a deterministic message for a
//! given bad payload. All fields are trimmed before checking, and the
//! trimmed values are what flows into the rest of the system.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotRequest {
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
    #[serde(default, rename = "resetToken")]
    pub token: String,
}

/// Validated registration data with all fields trimmed.
#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub phone: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
}

pub fn check_phone(phone: &str) -> Result<String, String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err("phone number is required".into());
    }
    if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err("phone number must be 10 digits".into());
    }
    if !phone.starts_with('0') {
        return Err("phone number must start with 0".into());
    }
    Ok(phone.to_string())
}

pub fn check_password(password: &str) -> Result<String, String> {
    let password = password.trim();
    if password.is_empty() {
        return Err("password is required".into());
    }
    if password.chars().count() < 6 {
        return Err("password must be at least 6 characters".into());
    }
    Ok(password.to_string())
}

fn check_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("name is required".into());
    }
    if name.chars().count() < 2 {
        return Err("name must be at least 2 characters".into());
    }
    Ok(name.to_string())
}

/// Optional email; empty counts as absent, anything present must look
/// like an address (one `@`, non-empty parts, a dot in the domain).
fn check_email(email: Option<&str>) -> Result<Option<String>, String> {
    let Some(email) = email else {
        return Ok(None);
    };
    let email = email.trim();
    if email.is_empty() {
        return Ok(None);
    }
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next();
    let shape_ok = match domain {
        Some(domain) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !shape_ok {
        return Err("email is not valid".into());
    }
    Ok(Some(email.to_string()))
}

pub fn registration(req: &RegisterRequest) -> Result<ValidRegistration, String> {
    let phone = check_phone(&req.phone)?;
    let password = check_password(&req.password)?;
    let name = check_name(&req.name)?;
    let email = check_email(req.email.as_deref())?;
    Ok(ValidRegistration {
        phone,
        password,
        name,
        email,
    })
}

/// Login applies the full phone format rule; the password only needs to
/// be present, since the stored one carries the length guarantee.
pub fn login(req: &LoginRequest) -> Result<(String, String), String> {
    let phone = check_phone(&req.phone)?;
    let password = req.password.trim();
    if password.is_empty() {
        return Err("password is required".into());
    }
    Ok((phone, password.to_string()))
}

pub fn forgot(req: &ForgotRequest) -> Result<String, String> {
    check_phone(&req.phone)
}

pub fn verify_otp(req: &VerifyOtpRequest) -> Result<(String, String), String> {
    let phone = check_phone(&req.phone)?;
    let otp = req.otp.trim();
    if otp.is_empty() {
        return Err("OTP is required".into());
    }
    Ok((phone, otp.to_string()))
}

pub fn reset(req: &ResetRequest) -> Result<(String, String, String), String> {
    let phone = req.phone.trim();
    if phone.is_empty() {
        return Err("phone number is required".into());
    }
    let password = check_password(&req.new_password)?;
    let token = req.token.trim();
    if token.is_empty() {
        return Err("reset token is required".into());
    }
    Ok((phone.to_string(), password, token.to_string()))
}

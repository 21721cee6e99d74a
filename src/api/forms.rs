//! Request bodies for every form the site accepts, and the rules they're validated against.
use crate::api::media::ImageUpload;
use crate::twoface::{Describe, ExternalError, Fallible};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Like the usual username rules: letters, digits and @/./+/-/_ only.
fn valid_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_chars"))
    }
}

fn valid_slug(slug: &str) -> Result<(), ValidationError> {
    if slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("slug_chars"))
    }
}

fn not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

fn email_or_blank(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || validator::validate_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("email"))
    }
}

/// Run the form's rules. The user sees the message for the first bad field (alphabetically, so
/// the message is stable); the full report goes to the logs.
fn check<F: Validate>(form: &F, message_for: fn(&str) -> &'static str) -> Fallible<()> {
    form.validate().map_err(|errors| {
        let text = errors
            .field_errors()
            .keys()
            .min()
            .map(|field| message_for(field))
            .unwrap_or("Invalid form");
        errors.describe(ExternalError::invalid_field(text))
    })
}

/// An empty choice means "no group".
fn blank_as_none(group: &Option<String>) -> Option<&str> {
    group.as_deref().map(str::trim).filter(|slug| !slug.is_empty())
}

#[derive(Deserialize, Validate, Debug)]
pub struct PostForm {
    #[validate(custom = "not_blank")]
    pub text: String,
    /// Slug of the group to file the post under
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub image: Option<ImageUpload>,
    /// Drop the current image when editing (ignored if a new image is uploaded).
    #[serde(default)]
    pub clear_image: bool,
}

impl PostForm {
    pub fn check(&self) -> Fallible<()> {
        check(self, |_| "Post text must not be empty")
    }

    pub fn group_slug(&self) -> Option<&str> {
        blank_as_none(&self.group)
    }
}

#[derive(Deserialize, Validate, Debug)]
pub struct CommentForm {
    #[validate(custom = "not_blank")]
    pub text: String,
}

impl CommentForm {
    pub fn check(&self) -> Fallible<()> {
        check(self, |_| "Comment text must not be empty")
    }
}

#[derive(Deserialize, Validate, Debug)]
pub struct SignupForm {
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
    #[validate(length(min = 1, max = 150), custom = "valid_username")]
    pub username: String,
    #[serde(default)]
    #[validate(length(max = 254), custom = "email_or_blank")]
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl SignupForm {
    pub fn check(&self) -> Fallible<()> {
        check(self, |field| match field {
            "username" => "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters, at most 150 of them",
            "email" => "Enter a valid email address",
            _ => "Names may have at most 150 characters",
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Deserialize, Validate, Debug)]
pub struct PasswordResetForm {
    #[validate(email)]
    pub email: String,
}

impl PasswordResetForm {
    pub fn check(&self) -> Fallible<()> {
        check(self, |_| "Enter a valid email address")
    }
}

/// The token comes from the link in the reset email.
#[derive(Deserialize, Debug)]
pub struct PasswordResetConfirmForm {
    pub token: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Deserialize, Validate, Debug)]
pub struct GroupForm {
    #[validate(length(max = 200), custom = "not_blank")]
    pub title: String,
    #[validate(length(min = 1, max = 50), custom = "valid_slug")]
    pub slug: String,
    #[serde(default)]
    #[validate(length(max = 400))]
    pub description: String,
}

impl GroupForm {
    pub fn check(&self) -> Fallible<()> {
        check(self, |field| match field {
            "title" => "Group title must be 1 to 200 characters",
            "slug" => "Enter a valid slug consisting of letters, numbers, underscores or hyphens",
            _ => "Group description must be at most 400 characters",
        })
    }
}

/// Admin change of a post's group.
#[derive(Deserialize, Debug)]
pub struct RegroupForm {
    #[serde(default)]
    pub group: Option<String>,
}

impl RegroupForm {
    pub fn group_slug(&self) -> Option<&str> {
        blank_as_none(&self.group)
    }
}

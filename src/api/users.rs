//! Accounts: sign-up, logging in and out, changing passwords.
use crate::api::{
    auth::{LoggedIn, Tokens},
    forms::{
        LoginForm, PasswordChangeForm, PasswordResetConfirmForm, PasswordResetForm, SignupForm,
    },
    mail::OutgoingMail,
    observe,
    passwords::{check_password_rules, hash_password_blocking, verify_password_blocking},
    urls, State, UserFacingUser,
};
use crate::datastore::{structs::NewUser, Datastore};
use crate::twoface::{Cause, Fallible, TfError};
use actix_web::{http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub fn configure<DS: Datastore>(cfg: &mut web::ServiceConfig) {
    cfg.route("/signup/", web::post().to(signup::<DS>))
        .route("/login/", web::post().to(login::<DS>))
        .route("/logout/", web::post().to(logout))
        .route("/password_change/", web::post().to(password_change::<DS>))
        .route("/password_reset/", web::post().to(password_reset::<DS>))
        .route(
            "/password_reset/confirm/",
            web::post().to(password_reset_confirm::<DS>),
        );
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Seconds until the token stops working
    pub expires_in: i64,
}

#[derive(Serialize)]
struct Ack {
    detail: &'static str,
}

fn bad_credentials() -> TfError {
    TfError::reject(Cause::UserBadAuth, "Invalid username or password")
}

async fn signup<DS: Datastore>(
    state: web::Data<State<DS>>,
    form: web::Json<SignupForm>,
) -> Fallible<HttpResponse> {
    observe("signup", || async {
        form.check()?;
        check_password_rules(&form.password, &form.password_confirm, &form.username)?;
        let password_hash = hash_password_blocking(form.password.clone()).await?;
        let user = state
            .ds
            .new_user(NewUser {
                username: form.username.clone(),
                email: form.email.trim().to_owned(),
                first_name: form.first_name.clone(),
                last_name: form.last_name.clone(),
                password_hash,
            })
            .await?;
        info!(user_id = user.id, user = %user, "signed up");
        Ok(HttpResponse::Created()
            .header(header::LOCATION, urls::index())
            .json(UserFacingUser::from(user)))
    })
    .await
}

async fn login<DS: Datastore>(
    state: web::Data<State<DS>>,
    tokens: web::Data<Tokens>,
    form: web::Json<LoginForm>,
) -> Fallible<web::Json<LoginResponse>> {
    observe("login", || async {
        guard!(let Some(user) = state.ds.find_user(&form.username).await? else {
            return Err(bad_credentials());
        });
        verify_password_blocking(form.password.clone(), user.password_hash.clone()).await?;
        let token = tokens.issue(&user)?;
        info!(user_id = user.id, "logged in");
        Ok(web::Json(LoginResponse {
            token,
            token_type: "Bearer".to_owned(),
            expires_in: tokens.ttl_secs(),
        }))
    })
    .await
}

/// Tokens aren't stored anywhere, so there's nothing to revoke. The client drops its token.
async fn logout(viewer: LoggedIn) -> Fallible<web::Json<Ack>> {
    observe("logout", || async {
        info!(user_id = viewer.0.sub, "logged out");
        Ok(web::Json(Ack {
            detail: "You have been logged out",
        }))
    })
    .await
}

async fn password_change<DS: Datastore>(
    state: web::Data<State<DS>>,
    viewer: LoggedIn,
    form: web::Json<PasswordChangeForm>,
) -> Fallible<web::Json<Ack>> {
    observe("password_change", || async {
        guard!(let Some(user) = state.ds.get_user(viewer.0.sub).await? else {
            return Err(bad_credentials());
        });
        verify_password_blocking(form.old_password.clone(), user.password_hash.clone())
            .await
            .map_err(|e| match e.cause() {
                Cause::UserBadAuth => TfError::reject(
                    Cause::UserInvalidField,
                    "Your old password was entered incorrectly",
                ),
                _ => e,
            })?;
        check_password_rules(
            &form.new_password,
            &form.new_password_confirm,
            &user.username,
        )?;
        let password_hash = hash_password_blocking(form.new_password.clone()).await?;
        state.ds.set_password_hash(user.id, password_hash).await?;
        info!(user_id = user.id, "changed password");
        Ok(web::Json(Ack {
            detail: "Your password was changed",
        }))
    })
    .await
}

/// Emails a reset link to every account with this address. The answer is the same whether or
/// not any account matched, so the endpoint can't be used to find out who has an account.
async fn password_reset<DS: Datastore>(
    state: web::Data<State<DS>>,
    tokens: web::Data<Tokens>,
    form: web::Json<PasswordResetForm>,
) -> Fallible<web::Json<Ack>> {
    observe("password_reset", || async {
        form.check()?;
        for user in state.ds.find_users_by_email(form.email.trim()).await? {
            let token = tokens.issue_reset(&user)?;
            let mail = OutgoingMail {
                to: user.email.clone(),
                subject: "Password reset on Yatube".to_owned(),
                body: format!(
                    "You're receiving this email because you requested a password reset for \
                     your user account at Yatube.\n\n\
                     Please go to the following page and choose a new password:\n\n\
                     {}/auth/password_reset/confirm/?token={}\n\n\
                     Your username, in case you've forgotten: {}\n",
                    state.site_url, token, user.username
                ),
            };
            // The remaining accounts still get their link.
            if let Err(e) = state.mailer.send(mail).await {
                warn!(user_id = user.id, "couldn't send reset email: {:#}", e.internal);
                continue;
            }
            info!(user_id = user.id, "sent password reset link");
        }
        Ok(web::Json(Ack {
            detail: "We've emailed you instructions for setting your password, \
                     if an account exists with the email you entered",
        }))
    })
    .await
}

async fn password_reset_confirm<DS: Datastore>(
    state: web::Data<State<DS>>,
    tokens: web::Data<Tokens>,
    form: web::Json<PasswordResetConfirmForm>,
) -> Fallible<web::Json<Ack>> {
    observe("password_reset_confirm", || async {
        let claims = tokens.verify_reset(&form.token)?;
        guard!(let Some(user) = state.ds.get_user(claims.sub).await? else {
            return Err(TfError::reject(
                Cause::UserInvalidField,
                "The password reset link was invalid, possibly because it has already been used",
            ));
        });
        Tokens::reset_matches(&claims, &user)?;
        check_password_rules(
            &form.new_password,
            &form.new_password_confirm,
            &user.username,
        )?;
        let password_hash = hash_password_blocking(form.new_password.clone()).await?;
        state.ds.set_password_hash(user.id, password_hash).await?;
        info!(user_id = user.id, "reset password");
        Ok(web::Json(Ack {
            detail: "Your password has been set. You may go ahead and log in now",
        }))
    })
    .await
}

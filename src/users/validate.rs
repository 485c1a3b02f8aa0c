use lazy_static::lazy_static;
use regex::Regex;

use super::repo_types::{FieldChange, NewUser, ProfileChange};
use crate::error::{Field, UserError};

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9]{1,20}$").unwrap();
    static ref DIGEST_RE: Regex = Regex::new(r"^[0-9a-f]{64}$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+[1-9][0-9]{1,14}$").unwrap();
}

pub fn username(v: &str) -> Result<(), UserError> {
    if !USERNAME_RE.is_match(v) {
        return Err(UserError::invalid(Field::Username, "must be 1-20 letters or digits"));
    }
    Ok(())
}

pub fn password(v: &str) -> Result<(), UserError> {
    if !DIGEST_RE.is_match(v) {
        return Err(UserError::invalid(Field::Password, "must be a 64-char hex digest"));
    }
    Ok(())
}

pub fn email(v: &str) -> Result<(), UserError> {
    if v.len() > 50 || !EMAIL_RE.is_match(v) {
        return Err(UserError::invalid(Field::Email, "not a valid email"));
    }
    Ok(())
}

pub fn phone(v: &str) -> Result<(), UserError> {
    if !PHONE_RE.is_match(v) {
        return Err(UserError::invalid(Field::Phone, "not an E.164 number"));
    }
    Ok(())
}

fn max_chars(field: Field, v: &str, max: usize) -> Result<(), UserError> {
    if v.chars().count() > max {
        return Err(UserError::invalid(field, "too long"));
    }
    Ok(())
}

pub fn new_user(u: &NewUser) -> Result<(), UserError> {
    username(&u.username)?;
    password(&u.password)?;
    if let Some(v) = &u.email {
        email(v)?;
    }
    if let Some(v) = &u.phone {
        phone(v)?;
    }
    Ok(())
}

pub fn profile_change(c: &ProfileChange) -> Result<(), UserError> {
    if let FieldChange::Set(v) = &c.email {
        email(v)?;
    }
    if let FieldChange::Set(v) = &c.phone {
        phone(v)?;
    }
    if let FieldChange::Set(v) = &c.room_name {
        max_chars(Field::RoomName, v, 30)?;
    }
    if let FieldChange::Set(v) = &c.room_intro {
        max_chars(Field::RoomIntro, v, 200)?;
    }
    Ok(())
}

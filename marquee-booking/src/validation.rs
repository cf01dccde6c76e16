use marquee_core::seats::SeatSelection;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::BookingError;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MAX_PHONE_LEN: usize = 20;
const MAX_TITLE_LEN: usize = 255;
/// Money columns are NUMERIC(12, 2): two decimals, below 10^10.
const MONEY_SCALE: u32 = 2;
const MONEY_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Booking request as submitted. Every field is optional so that all
/// missing ones can be reported together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingDraft {
    pub showtime_id: Option<i64>,
    pub movie_title: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub seat_numbers: Option<SeatSelection>,
    pub total_amount: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ValidBooking {
    pub showtime_id: i64,
    pub movie_title: String,
    pub customer: Contact,
    pub seat_numbers: Vec<String>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleDraft {
    pub bundle_id: Option<i64>,
    pub bundle_name: Option<String>,
    pub bundle_description: Option<String>,
    pub bundle_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub savings: Option<Decimal>,
    pub quantity: Option<i32>,
    pub total_price: Option<Decimal>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidBundle {
    pub bundle_id: i64,
    pub bundle_name: String,
    pub bundle_description: Option<String>,
    pub bundle_price: Decimal,
    pub original_price: Option<Decimal>,
    pub savings: Option<Decimal>,
    pub quantity: i32,
    pub total_price: Decimal,
    pub customer: Contact,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Collects invalid field names; reported after the missing-field check.
#[derive(Default)]
struct Problems {
    fields: Vec<&'static str>,
    reasons: Vec<String>,
}

impl Problems {
    fn flag(&mut self, field: &'static str, reason: impl Into<String>) {
        self.fields.push(field);
        self.reasons.push(reason.into());
    }

    fn into_result(self) -> Result<(), BookingError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        Err(BookingError::Validation {
            message: self.reasons.join("; "),
            fields: self.fields.into_iter().map(String::from).collect(),
        })
    }
}

fn check_contact(problems: &mut Problems, name: &str, email: &str, phone: Option<&str>) {
    if name.chars().count() > MAX_NAME_LEN {
        problems.flag("customer_name", format!("customer_name exceeds {} characters", MAX_NAME_LEN));
    }
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        problems.flag("customer_email", "customer_email is not a valid address");
    }
    if let Some(phone) = phone {
        if phone.chars().count() > MAX_PHONE_LEN {
            problems.flag("customer_phone", format!("customer_phone exceeds {} characters", MAX_PHONE_LEN));
        }
    }
}

fn check_title(problems: &mut Problems, field: &'static str, title: &str) {
    if title.chars().count() > MAX_TITLE_LEN {
        problems.flag(field, format!("{} exceeds {} characters", field, MAX_TITLE_LEN));
    }
}

/// Amounts must fit the stored column exactly: no rounding, no overflow.
fn check_amount(problems: &mut Problems, field: &'static str, amount: Option<Decimal>) {
    let Some(amount) = amount else {
        return;
    };
    if amount.is_sign_negative() && !amount.is_zero() {
        problems.flag(field, format!("{} must not be negative", field));
    } else if amount.normalize().scale() > MONEY_SCALE {
        problems.flag(field, format!("{} must have at most {} decimal places", field, MONEY_SCALE));
    } else if amount >= MONEY_LIMIT {
        problems.flag(field, format!("{} must be less than {}", field, MONEY_LIMIT));
    }
}

impl BookingDraft {
    pub fn validate(self) -> Result<ValidBooking, BookingError> {
        let movie_title = present(&self.movie_title);
        let name = present(&self.customer_name);
        let email = present(&self.customer_email).map(|e| e.to_lowercase());
        let phone = present(&self.customer_phone);

        let mut problems = Problems::default();
        let seats = match self.seat_numbers {
            Some(selection) => match selection.into_seats() {
                Ok(seats) => Some(seats).filter(|s| !s.is_empty()),
                Err(e) => {
                    problems.flag("seat_numbers", e.to_string());
                    Some(Vec::new())
                }
            },
            None => None,
        };

        let mut missing = Vec::new();
        if self.showtime_id.is_none() {
            missing.push("showtime_id");
        }
        if movie_title.is_none() {
            missing.push("movie_title");
        }
        if name.is_none() {
            missing.push("customer_name");
        }
        if email.is_none() {
            missing.push("customer_email");
        }
        if self.total_amount.is_none() {
            missing.push("total_amount");
        }
        if seats.is_none() {
            missing.push("seat_numbers");
        }

        match (self.showtime_id, movie_title, name, email, self.total_amount, seats) {
            (Some(showtime_id), Some(movie_title), Some(name), Some(email), Some(total_amount), Some(seat_numbers))
                if missing.is_empty() =>
            {
                if showtime_id <= 0 {
                    problems.flag("showtime_id", "showtime_id must be positive");
                }
                check_title(&mut problems, "movie_title", &movie_title);
                check_amount(&mut problems, "total_amount", Some(total_amount));
                check_contact(&mut problems, &name, &email, phone.as_deref());
                if seat_numbers.is_empty() && !problems.fields.contains(&"seat_numbers") {
                    problems.flag("seat_numbers", "seat_numbers must not be empty");
                }
                problems.into_result()?;

                Ok(ValidBooking {
                    showtime_id,
                    movie_title,
                    customer: Contact { name, email, phone },
                    seat_numbers,
                    total_amount,
                })
            }
            _ => Err(BookingError::missing_fields(missing)),
        }
    }
}

impl BundleDraft {
    pub fn validate(self) -> Result<ValidBundle, BookingError> {
        let bundle_name = present(&self.bundle_name);
        let name = present(&self.customer_name);
        let email = present(&self.customer_email).map(|e| e.to_lowercase());
        let phone = present(&self.customer_phone);

        let mut missing = Vec::new();
        if self.bundle_id.is_none() {
            missing.push("bundle_id");
        }
        if bundle_name.is_none() {
            missing.push("bundle_name");
        }
        if self.bundle_price.is_none() {
            missing.push("bundle_price");
        }
        if name.is_none() {
            missing.push("customer_name");
        }
        if email.is_none() {
            missing.push("customer_email");
        }

        let (Some(bundle_id), Some(bundle_name), Some(bundle_price), Some(name), Some(email)) =
            (self.bundle_id, bundle_name, self.bundle_price, name, email)
        else {
            return Err(BookingError::missing_fields(missing));
        };

        let quantity = self.quantity.unwrap_or(1);
        let total_price = self
            .total_price
            .unwrap_or_else(|| bundle_price * Decimal::from(quantity.max(0)));

        let mut problems = Problems::default();
        if quantity < 1 {
            problems.flag("quantity", "quantity must be at least 1");
        }
        check_title(&mut problems, "bundle_name", &bundle_name);
        check_amount(&mut problems, "bundle_price", Some(bundle_price));
        check_amount(&mut problems, "original_price", self.original_price);
        check_amount(&mut problems, "savings", self.savings);
        check_amount(&mut problems, "total_price", Some(total_price));
        check_contact(&mut problems, &name, &email, phone.as_deref());
        problems.into_result()?;

        Ok(ValidBundle {
            bundle_id,
            bundle_name,
            bundle_description: present(&self.bundle_description),
            bundle_price,
            original_price: self.original_price,
            savings: self.savings,
            quantity,
            total_price,
            customer: Contact { name, email, phone },
        })
    }
}

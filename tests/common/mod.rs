//! Shared fixtures for integration tests.

use campaign_lens::{load, DataFormat, Table};

/// A small bank-marketing extract, `;`-delimited like the original export.
pub const BANK_CSV: &str = "\
age;job;marital;default;housing;loan;contact;month;day_of_week;duration;y
56;housemaid;married;no;no;no;telephone;may;mon;261;no
57;services;married;unknown;no;no;telephone;may;mon;149;no
37;services;married;no;yes;no;telephone;may;mon;226;no
40;admin.;married;no;no;no;telephone;may;mon;151;no
56;services;married;no;no;yes;telephone;may;mon;307;no
45;services;married;unknown;no;no;telephone;may;mon;198;no
59;admin.;married;no;no;no;telephone;may;mon;139;no
41;blue-collar;married;unknown;no;no;telephone;may;mon;217;no
24;technician;single;no;yes;no;cellular;jun;tue;380;yes
25;services;single;no;yes;no;cellular;jun;tue;50;no
29;blue-collar;single;no;no;yes;cellular;jul;wed;1094;yes
35;blue-collar;married;no;yes;no;cellular;aug;thu;615;yes
30;admin.;single;no;yes;no;cellular;aug;fri;;yes
";

pub fn bank() -> Table {
    load(BANK_CSV.as_bytes(), DataFormat::Csv { delimiter: b';' }).expect("fixture should load")
}

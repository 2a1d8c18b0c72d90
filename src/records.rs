use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::Row;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StudentStatus {
    Active,
    Alumni,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "Active",
            StudentStatus::Alumni => "Alumni",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "alumni" => Some(Self::Alumni),
            _ => None,
        }
    }
}

impl FromSql for StudentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown student status: {}", s).into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub status: StudentStatus,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub guardian_email: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

pub const STUDENT_COLUMNS: &str =
    "id, name, class_name, status, guardian_name, guardian_phone, guardian_email, created_at, updated_at";

impl Student {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            class_name: r.get(2)?,
            status: r.get(3)?,
            guardian_name: r.get(4)?,
            guardian_phone: r.get(5)?,
            guardian_email: r.get(6)?,
            created_at: r.get(7)?,
            updated_at: r.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StaffStatus {
    Active,
    Inactive,
}

impl StaffStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StaffStatus::Active => "Active",
            StaffStatus::Inactive => "Inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl FromSql for StaffStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown staff status: {}", s).into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub role: String,
    pub salary: i64,
    pub status: StaffStatus,
    pub created_at: String,
}

pub const STAFF_COLUMNS: &str = "id, name, role, salary, status, created_at";

impl Staff {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            role: r.get(2)?,
            salary: r.get(3)?,
            status: r.get(4)?,
            created_at: r.get(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub student_id: String,
    pub description: String,
    pub amount: i64,
    pub status: String,
    pub due_date: Option<String>,
    pub created_at: String,
}

pub const INVOICE_COLUMNS: &str = "id, student_id, description, amount, status, due_date, created_at";

pub const INVOICE_UNPAID: &str = "Unpaid";
pub const INVOICE_PAID: &str = "Paid";

impl Invoice {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            student_id: r.get(1)?,
            description: r.get(2)?,
            amount: r.get(3)?,
            status: r.get(4)?,
            due_date: r.get(5)?,
            created_at: r.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub kind: String,
    pub category: String,
    pub description: String,
    pub amount: i64,
    pub status: String,
    pub invoice_id: Option<String>,
    pub staff_id: Option<String>,
    pub date: String,
}

pub const TRANSACTION_COLUMNS: &str =
    "id, kind, category, description, amount, status, invoice_id, staff_id, date";

impl Transaction {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            kind: r.get(1)?,
            category: r.get(2)?,
            description: r.get(3)?,
            amount: r.get(4)?,
            status: r.get(5)?,
            invoice_id: r.get(6)?,
            staff_id: r.get(7)?,
            date: r.get(8)?,
        })
    }

    pub fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO transactions(id, kind, category, description, amount, status, invoice_id, staff_id, date)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &self.id,
                &self.kind,
                &self.category,
                &self.description,
                self.amount,
                &self.status,
                &self.invoice_id,
                &self.staff_id,
                &self.date,
            ),
        )?;
        Ok(())
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a user identity was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Telegram,
    Web,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Telegram => "telegram",
            IdentityKind::Web => "web",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(IdentityKind::Telegram),
            "web" => Ok(IdentityKind::Web),
            other => Err(format!("unknown identity kind: {other}")),
        }
    }
}

/// Lifecycle of an order.
///
/// `Unpaid` is the only non-terminal state. Expired unpaid orders are not a
/// state of their own: the reaper deletes them outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Unpaid,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unpaid => "unpaid",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Unpaid)
    }

    /// Whether an order in `self` may move to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Unpaid, OrderStatus::Paid) | (OrderStatus::Unpaid, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(OrderStatus::Unpaid),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Coarse media class of an attachment, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    File,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

impl FileKind {
    pub fn from_filename(name: &str) -> Self {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return FileKind::File;
        };
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Video
        } else {
            FileKind::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::File => "file",
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(FileKind::Image),
            "video" => Ok(FileKind::Video),
            "file" => Ok(FileKind::File),
            other => Err(format!("unknown file kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_transitions() {
        assert!(OrderStatus::Unpaid.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Unpaid.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Unpaid));
        assert!(!OrderStatus::Unpaid.can_transition_to(OrderStatus::Unpaid));
        assert!(OrderStatus::Paid.is_terminal());
    }

    #[test]
    fn test_file_kind_from_filename() {
        assert_eq!(FileKind::from_filename("photo.JPG"), FileKind::Image);
        assert_eq!(FileKind::from_filename("clip.webm"), FileKind::Video);
        assert_eq!(FileKind::from_filename("notes.pdf"), FileKind::File);
        assert_eq!(FileKind::from_filename("README"), FileKind::File);
    }

    #[test]
    fn test_status_string_form() {
        for status in [OrderStatus::Unpaid, OrderStatus::Paid, OrderStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("expired".parse::<OrderStatus>().is_err());
    }
}

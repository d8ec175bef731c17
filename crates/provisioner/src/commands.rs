//! macOS command builders.
//!
//! Values are always passed as positional arguments, never interpolated
//! into the script text.

use crate::executor::ShellCommand;
use std::path::Path;

const CREATE_USER_SCRIPT: &str = r#"set -e
if [ "$3" = "true" ]; then
    sysadminctl -addUser "$1" -fullName "$0" -password "$2" -admin
else
    sysadminctl -addUser "$1" -fullName "$0" -password "$2"
fi
"#;

// sysadminctl exits 0 on several token failures, so scan its output too.
const SECURE_TOKEN_SCRIPT: &str = r#"out=$(sysadminctl -secureTokenOn "$0" -password "$1" -adminUser "$2" -adminPassword "$3" 2>&1)
status=$?
echo "$out"
if [ $status -ne 0 ] || printf '%s' "$out" | grep -qi 'error'; then
    exit 1
fi
"#;

const ENABLE_FILEVAULT_SCRIPT: &str = r#"fdesetup enable -inputplist <<PLIST
<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Username</key>
    <string>$0</string>
    <key>Password</key>
    <string>$1</string>
</dict>
</plist>
PLIST
"#;

pub const SOCKET_FILTER: &str = "/usr/libexec/ApplicationFirewall/socketfilterfw";

pub fn sudo_session(password: &str) -> ShellCommand {
    ShellCommand::new("sudo session", "sudo -S -v").stdin(format!("{}\n", password))
}

pub fn create_account(
    display_name: &str,
    account_name: &str,
    password: &str,
    admin: bool,
) -> ShellCommand {
    ShellCommand::new(format!("create account {}", account_name), CREATE_USER_SCRIPT)
        .args([display_name, account_name, password])
        .arg(admin.to_string())
        .elevated()
}

pub fn secure_token(
    account_name: &str,
    password: &str,
    admin_user: &str,
    admin_password: &str,
) -> ShellCommand {
    ShellCommand::new(format!("secure token {}", account_name), SECURE_TOKEN_SCRIPT)
        .args([account_name, password, admin_user, admin_password])
        .elevated()
}

pub fn delete_account(account_name: &str) -> ShellCommand {
    ShellCommand::new(
        format!("delete account {}", account_name),
        r#"sysadminctl -deleteUser "$0""#,
    )
    .arg(account_name)
    .elevated()
}

pub fn filevault_status() -> ShellCommand {
    ShellCommand::new("filevault status", "fdesetup isactive").elevated()
}

pub fn filevault_enable(admin_user: &str, admin_password: &str) -> ShellCommand {
    ShellCommand::new("filevault enable", ENABLE_FILEVAULT_SCRIPT)
        .args([admin_user, admin_password])
        .elevated()
}

pub fn firewall_status() -> ShellCommand {
    ShellCommand::new("firewall status", format!("{} --getglobalstate", SOCKET_FILTER))
        .elevated()
}

pub fn firewall_enable() -> ShellCommand {
    ShellCommand::new(
        "firewall enable",
        format!("{} --setglobalstate on", SOCKET_FILTER),
    )
    .elevated()
}

pub fn set_policy(user: &str, policy: &str) -> ShellCommand {
    ShellCommand::new(
        format!("password policy {}", user),
        r#"pwpolicy -u "$0" -setpolicy "$1""#,
    )
    .args([user, policy])
    .elevated()
}

pub fn set_account_policies(user: &str, plist: &Path) -> ShellCommand {
    ShellCommand::new(
        format!("password policy {}", user),
        r#"pwpolicy -u "$0" -setaccountpolicies "$1""#,
    )
    .arg(user)
    .arg(plist.to_string_lossy())
    .elevated()
}

pub fn install_package(package: &Path) -> ShellCommand {
    ShellCommand::new(
        format!("install package {}", package.display()),
        r#"installer -pkg "$0" -target /"#,
    )
    .arg(package.to_string_lossy())
    .elevated()
}

/// Lists installed receipts matching rosetta. grep exits 1 on no match.
pub fn rosetta_check() -> ShellCommand {
    ShellCommand::new("rosetta check", "pkgutil --pkgs | grep -i rosetta")
}

pub fn rosetta_install() -> ShellCommand {
    ShellCommand::new(
        "rosetta install",
        "softwareupdate --install-rosetta --agree-to-license",
    )
    .elevated()
}

pub fn attach_disk_image(image: &Path) -> ShellCommand {
    ShellCommand::new(
        format!("attach {}", image.display()),
        r#"hdiutil attach "$0""#,
    )
    .arg(image.to_string_lossy())
}

pub fn copy_tree(source: &Path, target: &Path) -> ShellCommand {
    ShellCommand::new(format!("copy {}", source.display()), r#"cp -R "$0" "$1""#)
        .arg(source.to_string_lossy())
        .arg(target.to_string_lossy())
        .elevated()
}

pub fn detach_disk_image(mount_point: &Path) -> ShellCommand {
    ShellCommand::new(
        format!("detach {}", mount_point.display()),
        r#"hdiutil detach "$0""#,
    )
    .arg(mount_point.to_string_lossy())
}

pub fn serial_number() -> ShellCommand {
    ShellCommand::new("serial number", "ioreg -l | grep IOPlatformSerialNumber")
}

pub fn run_script(path: &Path) -> ShellCommand {
    ShellCommand::new(format!("script {}", path.display()), r#"bash "$0""#)
        .arg(path.to_string_lossy())
}

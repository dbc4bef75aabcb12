//! Dockerfile rendering for an image manifest.
//!
//! One instruction per directive, in the order the manifest dictates. The
//! start command is always rendered in exec form - the node binary runs as
//! PID 1 with no shell in between.

use super::{Directive, ImageManifest, ServiceAccount};

/// Render the manifest to Dockerfile text.
pub fn render(manifest: &ImageManifest) -> String {
    let mut out = String::new();
    for directive in manifest.directives() {
        out.push_str(&render_directive(&directive));
    }
    out
}

fn render_directive(directive: &Directive) -> String {
    match directive {
        Directive::From(base) => format!("FROM {}\n\n", base),
        Directive::CreateAccount(account) => render_account(account),
        Directive::CreateDir { path, owner: None } => format!("RUN mkdir -p {}\n", path),
        Directive::CreateDir {
            path,
            owner: Some(owner),
        } => format!("RUN mkdir -p {path} && chown -R {owner} {path}\n"),
        Directive::Symlink { link, target } => format!("RUN ln -s {} {}\n", target, link),
        Directive::RemovePaths(paths) => format!("RUN rm -rf {}\n", paths.join(" ")),
        Directive::CopyOwned {
            file_name,
            dest,
            owner,
        } => format!("COPY --chown={} {} {}\n", owner, file_name, dest),
        Directive::MarkExecutable(path) => format!("RUN chmod +x {}\n", path),
        Directive::SwitchUser(name) => format!("USER {}\n", name),
        Directive::Expose(ports) => {
            let ports = ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            format!("EXPOSE {}\n", ports)
        }
        Directive::Volume(path) => format!("VOLUME [\"{}\"]\n", path),
        Directive::Command(path) => format!("CMD [\"{}\"]\n", path),
    }
}

fn render_account(account: &ServiceAccount) -> String {
    if account.gid == account.uid {
        format!(
            "RUN useradd -m -u {} -U -s {} -d {} {}\n",
            account.uid, account.shell, account.home, account.name
        )
    } else {
        format!(
            "RUN groupadd -g {gid} {name} && useradd -m -u {uid} -g {gid} -s {shell} -d {home} {name}\n",
            gid = account.gid,
            uid = account.uid,
            shell = account.shell,
            home = account.home,
            name = account.name
        )
    }
}

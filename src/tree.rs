//! 按客户端声明的相对路径重建上传批次的目录树，仅用于日志输出。

use tracing::{debug, info};

use crate::upload::UploadedFile;

const INDENT: &str = "   ";

#[derive(Debug, PartialEq, Eq)]
pub enum TreeNode {
    File(u64),
    Directory(Directory),
}

/// 保持插入顺序的目录项列表。
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<(String, TreeNode)>,
}

impl Directory {
    pub fn get(&self, name: &str) -> Option<&TreeNode> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    fn entry_or_insert_with(
        &mut self,
        name: &str,
        make: impl FnOnce() -> TreeNode,
    ) -> &mut TreeNode {
        let index = match self.entries.iter().position(|(key, _)| key == name) {
            Some(index) => index,
            None => {
                self.entries.push((name.to_string(), make()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    /// 插入一条路径；已存在的节点一律保留（先到先得）。
    fn insert(&mut self, segments: &[String], size: u64) -> bool {
        let Some((leaf, parents)) = segments.split_last() else {
            return false;
        };

        let mut current = self;
        for segment in parents {
            let node = current.entry_or_insert_with(segment, || {
                TreeNode::Directory(Directory::default())
            });
            match node {
                TreeNode::Directory(dir) => current = dir,
                TreeNode::File(_) => return false,
            }
        }

        if current.get(leaf).is_some() {
            return false;
        }
        current.entries.push((leaf.clone(), TreeNode::File(size)));
        true
    }
}

/// 由上传批次构建目录树。
pub fn build_tree(files: &[UploadedFile]) -> Directory {
    let mut root = Directory::default();
    for file in files {
        if !root.insert(file.declared_name.segments(), file.size) {
            debug!(
                name = file.declared_name.as_path(),
                "tree entry already taken, keeping first arrival"
            );
        }
    }
    root
}

/// 前序深度优先渲染，每个目录项一行。
pub fn render(tree: &Directory) -> Vec<String> {
    let mut lines = Vec::new();
    render_into(tree, "", &mut lines);
    lines
}

fn render_into(dir: &Directory, prefix: &str, lines: &mut Vec<String>) {
    for (name, node) in dir.entries() {
        match node {
            TreeNode::File(size) => {
                lines.push(format!("{prefix}─{name} ({} KB)", format_kib(*size)));
            }
            TreeNode::Directory(child) => {
                lines.push(format!("{prefix}📂 {name}"));
                render_into(child, &format!("{prefix}{INDENT}"), lines);
            }
        }
    }
}

/// 字节数转 KiB，保留两位小数。
pub fn format_kib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1024.0)
}

/// 输出上传批次的目录树日志。
pub fn log_tree(files: &[UploadedFile]) {
    info!("📂 Upload Tree:");
    for line in render(&build_tree(files)) {
        info!("{line}");
    }
}

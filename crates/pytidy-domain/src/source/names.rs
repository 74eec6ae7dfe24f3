use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

/// Standard-library module names that must never be treated as
/// installable packages.
static STDLIB_MODULES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abc", "aifc", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore", "atexit",
        "audioop", "base64", "bdb", "binascii", "binhex", "bisect", "builtins", "bz2", "calendar",
        "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs", "codeop", "collections",
        "colorsys", "compileall", "concurrent", "configparser", "contextlib", "contextvars",
        "copy", "copyreg", "cProfile", "crypt", "csv", "ctypes", "curses", "dataclasses",
        "datetime", "dbm", "decimal", "difflib", "dis", "distutils", "doctest", "dummy_threading",
        "email", "encodings", "ensurepip", "enum", "errno", "faulthandler", "fcntl", "filecmp",
        "fileinput", "fnmatch", "formatter", "fractions", "ftplib", "functools", "gc", "getopt",
        "getpass", "gettext", "glob", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http",
        "idlelib", "imaplib", "imghdr", "imp", "importlib", "inspect", "io", "ipaddress",
        "itertools", "json", "keyword", "lib2to3", "linecache", "locale", "logging", "lzma",
        "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder", "msilib",
        "msvcrt", "multiprocessing", "netrc", "nis", "nntplib", "numbers", "operator", "optparse",
        "os", "ossaudiodev", "parser", "pathlib", "pdb", "pickle", "pickletools", "pipes",
        "pkgutil", "platform", "plistlib", "poplib", "posix", "posixpath", "pprint", "profile",
        "pstats", "pty", "pwd", "py_compile", "pyclbr", "pydoc", "queue", "quopri", "random",
        "re", "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched", "secrets",
        "select", "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtpd", "smtplib",
        "sndhdr", "socket", "socketserver", "spwd", "sqlite3", "ssl", "stat", "statistics",
        "string", "stringprep", "struct", "subprocess", "sunau", "symbol", "symtable", "sys",
        "sysconfig", "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "test",
        "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize", "trace",
        "traceback", "tracemalloc", "tty", "turtle", "turtledemo", "types", "typing",
        "typing_extensions", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv",
        "warnings", "wave", "weakref", "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib",
        "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "_thread", "__future__",
        "__main__",
    ]
    .into_iter()
    .collect()
});

/// Import names whose registry package is published under a different
/// name (e.g. the OpenCV binding imports as `cv2`).
static PACKAGE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("cv2", "opencv-python"),
        ("cv", "opencv-python"),
        ("PIL", "Pillow"),
        ("Image", "Pillow"),
        ("sklearn", "scikit-learn"),
        ("yaml", "pyyaml"),
        ("dotenv", "python-dotenv"),
        ("dateutil", "python-dateutil"),
        ("magic", "python-magic"),
        ("bs4", "beautifulsoup4"),
        ("OpenSSL", "pyOpenSSL"),
        ("wx", "wxPython"),
    ]
    .into_iter()
    .collect()
});

#[must_use]
pub fn is_stdlib_module(name: &str) -> bool {
    STDLIB_MODULES.contains(name)
}

/// Map an import name to its registry package name, passing unknown names
/// through unchanged.
#[must_use]
pub fn registry_package_name(import_name: &str) -> &str {
    PACKAGE_ALIASES
        .get(import_name)
        .copied()
        .unwrap_or(import_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdlib_names_are_recognized() {
        assert!(is_stdlib_module("os"));
        assert!(is_stdlib_module("__future__"));
        assert!(!is_stdlib_module("requests"));
    }

    #[test]
    fn aliases_map_to_registry_names() {
        assert_eq!(registry_package_name("cv2"), "opencv-python");
        assert_eq!(registry_package_name("bs4"), "beautifulsoup4");
        assert_eq!(registry_package_name("requests"), "requests");
    }
}

/// Served to the browser once the redirect has been captured.
pub const LOGIN_COMPLETE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Login successful</title>
<style>
body { font-family: sans-serif; display: flex; justify-content: center; margin-top: 15vh; color: #32363a; }
main { text-align: center; }
</style>
</head>
<body>
<main>
<h1>Login successful</h1>
<p>You can close this window and return to the terminal.</p>
</main>
</body>
</html>
"#;
